//! Crate-wide constants shared by sealing, the attestation circuit and host-side orchestration.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;

/// Number of decimal places carried by [`crate::types::Amount`].
pub const AMOUNT_DECIMALS: u32 = 8;

/// Base units per whole currency unit (10^AMOUNT_DECIMALS).
pub const BASE_UNITS_PER_WHOLE: u64 = 100_000_000;

/// Bit width every attested amount is range-constrained to.
pub const AMOUNT_BITS: usize = 64;

/// Version byte prefixed to every sealed value.
pub const SEAL_VERSION: u8 = 1;

/// Version byte prefixed to every proof token.
pub const PROOF_TOKEN_VERSION: u8 = 1;

/// Domain separator mixed into per-owner sealing keys.
pub const SEAL_KEY_DOMAIN: &[u8] = b"payroll-seal-key-v1";

/// Upper bound on attested batch slots. Keeps a hostile token from requesting an absurd key shape.
pub const MAX_ATTESTED_SLOTS: usize = 1 << 16;

// Poseidon sponge configuration.
//
// Width-3 sponge (rate=2, capacity=1), identical for the native hasher and the in-circuit gadget.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;
pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon S-box exponent (alpha).
pub const POSEIDON_ALPHA: u64 = 5;

/// Deterministically derive Poseidon parameters for BN254::Fr.
///
/// Both the native commitment and the circuit call this, so they always agree on ARK and MDS.
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits = Fr::MODULUS_BIT_SIZE as u64;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );

    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}
