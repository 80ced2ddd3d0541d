//! Confidentiality layer for the private payroll ledger.
//!
//! This crate contains:
//! - An exact fixed-point `Amount` type.
//! - Per-owner sealing of amounts (ChaCha20-Poly1305).
//! - A SNARK circuit that proves blinded commitments to salaries and batch totals.
//! - Prover + verifier orchestration and key storage.
//! - The `ConfidentialityProvider` contract the payroll core is written against.

pub mod circuit;
pub mod constants;
pub mod groth16;
pub mod provider;
pub mod seal;
pub mod types;

pub use provider::{Attestation, ConfidentialityProvider, ProviderError, ZkProvider};
pub use types::{Amount, AmountError, ProofToken, SealedValue, Statement};
