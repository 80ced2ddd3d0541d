//! R1CS circuit attesting to committed payroll amounts.
//!
//! What this circuit proves (for one shape):
//! 1) The prover knows `slots` private amounts, each fitting in 64 bits, and a private blinding factor.
//! 2) A public commitment `C` equals Poseidon(context, slots, blinding, amounts...).
//! 3) When the shape discloses a total, the public total equals the sum of the amounts.
//!
//! `context` is a public field element derived from the record the proof belongs to, so a proof cannot
//! be moved onto a different record. Amounts and blinding are witnesses.

use crate::constants::{poseidon_config, AMOUNT_BITS};
use ark_bn254::Fr;
use ark_ff::PrimeField;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_r1cs_std::{alloc::AllocVar, boolean::Boolean, eq::EqGadget, fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

/// Structural parameters a proving key is generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CircuitShape {
    /// Number of amount witnesses.
    pub slots: usize,
    /// Whether the sum of the amounts is a public input.
    pub discloses_total: bool,
}

impl CircuitShape {
    pub fn salary() -> Self {
        Self { slots: 1, discloses_total: false }
    }

    /// Batches are padded to a power of two so only a handful of keys ever exist.
    pub fn batch(len: usize) -> Self {
        Self { slots: len.max(1).next_power_of_two(), discloses_total: true }
    }

    pub fn file_stem(&self) -> String {
        let kind = if self.discloses_total { "batch" } else { "salary" };
        format!("groth16_{kind}_{}", self.slots)
    }
}

/// Map arbitrary context bytes to the field element a proof is bound to.
pub fn context_element(context: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(blake3::hash(context).as_bytes())
}

/// Native Poseidon commitment. This MUST match the circuit's absorb order.
pub fn commit_amounts(context: Fr, amounts: &[u64], blinding: Fr) -> Fr {
    let cfg = poseidon_config();
    let mut sponge = PoseidonSponge::<Fr>::new(&cfg);

    sponge.absorb(&context);
    sponge.absorb(&Fr::from(amounts.len() as u64));
    sponge.absorb(&blinding);
    for a in amounts {
        sponge.absorb(&Fr::from(*a));
    }

    sponge.squeeze_field_elements::<Fr>(1)[0]
}

/// Convert little-endian boolean bits into an FpVar.
fn bits_le_to_fp(bits_le: &[Boolean<Fr>]) -> FpVar<Fr> {
    let mut acc = FpVar::<Fr>::constant(Fr::from(0u64));
    let mut coeff = Fr::from(1u64);

    for b in bits_le {
        acc += FpVar::from(b.clone()) * coeff;
        coeff = coeff + coeff;
    }

    acc
}

/// Enforce that `v` fits in AMOUNT_BITS bits.
fn constrain_amount(v: &FpVar<Fr>) -> Result<(), SynthesisError> {
    let bits = v.to_bits_le()?;
    let reconstructed = bits_le_to_fp(&bits[..AMOUNT_BITS]);
    reconstructed.enforce_equal(v)
}

/// Circuit binding a blinded commitment (and optionally a total) to private amounts.
#[derive(Clone, Debug)]
pub struct AmountsCircuit {
    pub shape: CircuitShape,

    /// Private amounts, already padded to `shape.slots`.
    pub amounts: Vec<u64>,
    /// Private blinding factor.
    pub blinding: Fr,

    pub public_commitment: Fr,
    pub public_context: Fr,
    /// Ignored unless `shape.discloses_total`.
    pub public_total: u64,
}

impl AmountsCircuit {
    /// All-zero witness; constraints only depend on the shape.
    pub fn dummy(shape: CircuitShape) -> Self {
        let amounts = vec![0u64; shape.slots];
        let blinding = Fr::from(0u64);
        let context = Fr::from(0u64);
        Self {
            shape,
            public_commitment: commit_amounts(context, &amounts, blinding),
            public_context: context,
            amounts,
            blinding,
            public_total: 0,
        }
    }

    /// Public inputs in allocation order: commitment, context, then total if disclosed.
    pub fn public_inputs(shape: CircuitShape, commitment: Fr, context: Fr, total: u64) -> Vec<Fr> {
        let mut v = vec![commitment, context];
        if shape.discloses_total {
            v.push(Fr::from(total));
        }
        v
    }
}

impl ConstraintSynthesizer<Fr> for AmountsCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // IMPORTANT: public input ordering MUST match `AmountsCircuit::public_inputs`.
        let public_commitment = FpVar::<Fr>::new_input(cs.clone(), || Ok(self.public_commitment))?;
        let public_context = FpVar::<Fr>::new_input(cs.clone(), || Ok(self.public_context))?;
        let public_total = if self.shape.discloses_total {
            Some(FpVar::<Fr>::new_input(cs.clone(), || Ok(Fr::from(self.public_total)))?)
        } else {
            None
        };

        if self.amounts.len() != self.shape.slots {
            return Err(SynthesisError::Unsatisfiable);
        }

        let poseidon_cfg = poseidon_config();
        let mut sponge = PoseidonSpongeVar::<Fr>::new(cs.clone(), &poseidon_cfg);
        sponge.absorb(&public_context)?;

        let slots = FpVar::<Fr>::constant(Fr::from(self.shape.slots as u64));
        sponge.absorb(&slots)?;

        let blinding = FpVar::<Fr>::new_witness(cs.clone(), || Ok(self.blinding))?;
        sponge.absorb(&blinding)?;

        let mut sum = FpVar::<Fr>::constant(Fr::from(0u64));
        for a in self.amounts {
            let amount = FpVar::<Fr>::new_witness(cs.clone(), || Ok(Fr::from(a)))?;
            constrain_amount(&amount)?;
            sponge.absorb(&amount)?;
            sum += &amount;
        }

        let commitment = sponge.squeeze_field_elements(1)?.remove(0);
        commitment.enforce_equal(&public_commitment)?;

        if let Some(total) = public_total {
            sum.enforce_equal(&total)?;
        }

        Ok(())
    }
}
