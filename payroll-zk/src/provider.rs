//! The confidentiality contract used by the payroll core, and its Groth16-backed implementation.

use crate::circuit::{context_element, CircuitShape};
use crate::groth16::{prove_amounts, verify_token, AttestationToken, KeyStore, ZkError};
use crate::seal::Sealer;
use crate::types::{Amount, ProofToken, SealedValue, Statement};
use ark_bn254::Fr;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Input that is not structurally a sealed value at all.
    #[error("malformed sealed value: {0}")]
    MalformedSealedValue(String),

    /// Any other sealing, unsealing or attestation failure. Treated as possibly transient.
    #[error("confidentiality provider failure: {0}")]
    Failure(String),
}

impl From<ZkError> for ProviderError {
    fn from(e: ZkError) -> Self {
        ProviderError::Failure(e.to_string())
    }
}

/// Public facts carried by a token that verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attestation {
    /// Sum of the attested amounts. Present only for batch statements.
    pub total: Option<Amount>,
    /// Amount slots the proof covers, after padding.
    pub slots: usize,
    context: Fr,
}

impl Attestation {
    /// Whether the proof was issued for a statement with exactly these context bytes.
    pub fn is_bound_to(&self, context: &[u8]) -> bool {
        self.context == context_element(context)
    }

    /// Whether this is a batch attestation sized for `len` amounts.
    pub fn covers_batch_of(&self, len: usize) -> bool {
        self.total.is_some() && self.slots == CircuitShape::batch(len).slots
    }
}

/// Seal, unseal, attest and verify.
///
/// Implementations own no payroll data. Every call is a pure function of its inputs plus
/// internal randomness, so the same provider can be shared by the registry, the batch
/// processor and the query surface.
pub trait ConfidentialityProvider: Send + Sync {
    /// Hide `amount` so that only `owner` (through this provider) can recover it.
    /// Two seals of the same inputs never produce the same value.
    fn seal(&self, amount: Amount, owner: &str) -> Result<SealedValue, ProviderError>;

    /// Recover an amount sealed for `owner`. Never panics on malformed input.
    fn unseal(&self, sealed: &SealedValue, owner: &str) -> Result<Amount, ProviderError>;

    /// Produce a token proving the statement's amounts were committed.
    fn attest(&self, statement: Statement<'_>) -> Result<ProofToken, ProviderError>;

    /// Verify `token` and return what it publicly attests to. `None` unless it is well formed and was
    /// produced by `attest`.
    fn check(&self, token: &ProofToken) -> Option<Attestation>;

    /// Whether `token` is well formed and was produced by `attest`.
    fn verify(&self, token: &ProofToken) -> bool {
        self.check(token).is_some()
    }
}

/// ChaCha20-Poly1305 sealing plus Groth16/Poseidon attestations.
pub struct ZkProvider {
    sealer: Sealer,
    keys: KeyStore,
}

impl ZkProvider {
    pub fn new(master_key: [u8; 32], keys: KeyStore) -> Self {
        Self { sealer: Sealer::new(master_key), keys }
    }

    /// Decode the public part of a token without verifying it.
    pub fn inspect(token: &ProofToken) -> Result<AttestationToken, ZkError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(token.as_str())
            .map_err(|e| ZkError::MalformedToken(format!("invalid base64: {e}")))?;
        AttestationToken::from_bytes(&bytes)
    }
}

impl ConfidentialityProvider for ZkProvider {
    fn seal(&self, amount: Amount, owner: &str) -> Result<SealedValue, ProviderError> {
        self.sealer.seal(amount, owner)
    }

    fn unseal(&self, sealed: &SealedValue, owner: &str) -> Result<Amount, ProviderError> {
        self.sealer.unseal(sealed, owner)
    }

    fn attest(&self, statement: Statement<'_>) -> Result<ProofToken, ProviderError> {
        let (shape, amounts, context) = match statement {
            Statement::Salary { amount, context } => (CircuitShape::salary(), vec![amount.base_units()], context),
            Statement::Batch { amounts, context } => (
                CircuitShape::batch(amounts.len()),
                amounts.iter().map(|a| a.base_units()).collect(),
                context,
            ),
        };

        let token = prove_amounts(&self.keys, shape, context_element(context), &amounts)?;
        let bytes = token.to_bytes()?;
        Ok(ProofToken(base64::engine::general_purpose::STANDARD.encode(bytes)))
    }

    fn check(&self, token: &ProofToken) -> Option<Attestation> {
        let decoded = match Self::inspect(token) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(error = %e, "proof token rejected");
                return None;
            }
        };
        match verify_token(&self.keys, &decoded) {
            Ok(true) => Some(Attestation {
                total: decoded.shape.discloses_total.then(|| Amount::from_base_units(decoded.total)),
                slots: decoded.shape.slots,
                context: decoded.context,
            }),
            Ok(false) => {
                tracing::debug!("proof does not verify");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "proof token rejected");
                None
            }
        }
    }
}
