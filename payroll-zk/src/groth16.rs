//! Groth16 prover/verifier orchestration for the amounts circuit.
//!
//! SECURITY NOTE (prototype): Groth16 requires a trusted setup per circuit shape. Keys are
//! generated locally on first use. In production, an MPC ceremony (or a transparent system)
//! should be used.

use crate::circuit::{commit_amounts, AmountsCircuit, CircuitShape};
use crate::constants::{MAX_ATTESTED_SLOTS, PROOF_TOKEN_VERSION};
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::UniformRand;
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZkError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("malformed proof token: {0}")]
    MalformedToken(String),

    #[error("no verifying key for circuit shape {0:?}")]
    UnknownShape(CircuitShape),

    #[error("amounts overflow the disclosed total")]
    TotalOverflow,

    #[error("key storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arkworks error: {0}")]
    Ark(String),
}

/// Keys for one circuit shape.
pub struct ShapeKeys {
    pub pk: ProvingKey<Bn254>,
    pub pvk: PreparedVerifyingKey<Bn254>,
}

/// Keys for one shape, filled at most once. `None` until setup or load succeeds.
type ShapeSlot = Arc<Mutex<Option<Arc<ShapeKeys>>>>;

/// Per-shape key cache, optionally backed by a directory so tokens outlive the process.
///
/// The shape map is only locked long enough to find a slot. Setup and disk loads hold the slot
/// of their own shape, so verifying against a cached shape never waits on another shape's setup.
pub struct KeyStore {
    dir: Option<PathBuf>,
    slots: Mutex<HashMap<CircuitShape, ShapeSlot>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Nothing panics while holding these locks, but never let poisoning take attestation down.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl KeyStore {
    pub fn in_memory() -> Self {
        Self { dir: None, slots: Mutex::new(HashMap::new()) }
    }

    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()), slots: Mutex::new(HashMap::new()) }
    }

    fn slot(&self, shape: CircuitShape) -> ShapeSlot {
        lock(&self.slots).entry(shape).or_default().clone()
    }

    /// Keys for `shape`, running setup on first use.
    pub fn get_or_setup(&self, shape: CircuitShape) -> Result<Arc<ShapeKeys>, ZkError> {
        let slot = self.slot(shape);
        let mut cached = lock(&slot);
        if let Some(keys) = cached.as_ref() {
            return Ok(keys.clone());
        }

        let pk = match self.load(shape)? {
            Some(pk) => pk,
            None => {
                let pk = setup_keys(shape)?;
                self.store(shape, &pk)?;
                pk
            }
        };

        let keys = Arc::new(ShapeKeys { pvk: Groth16::<Bn254>::process_vk(&pk.vk).map_err(ark)?, pk });
        *cached = Some(keys.clone());
        Ok(keys)
    }

    /// Keys for `shape` only if they already exist. Verification never triggers a setup.
    pub fn get_existing(&self, shape: CircuitShape) -> Result<Option<Arc<ShapeKeys>>, ZkError> {
        let slot = self.slot(shape);
        let mut cached = lock(&slot);
        if let Some(keys) = cached.as_ref() {
            return Ok(Some(keys.clone()));
        }

        let Some(pk) = self.load(shape)? else {
            return Ok(None);
        };
        let keys = Arc::new(ShapeKeys { pvk: Groth16::<Bn254>::process_vk(&pk.vk).map_err(ark)?, pk });
        *cached = Some(keys.clone());
        Ok(Some(keys))
    }

    fn path(&self, shape: CircuitShape) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{}_pk.bin", shape.file_stem())))
    }

    fn load(&self, shape: CircuitShape) -> Result<Option<ProvingKey<Bn254>>, ZkError> {
        let Some(path) = self.path(shape) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        tracing::debug!(path = %path.display(), "loaded proving key");
        deserialize_pk(&bytes).map(Some)
    }

    fn store(&self, shape: CircuitShape, pk: &ProvingKey<Bn254>) -> Result<(), ZkError> {
        let Some(path) = self.path(shape) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serialize_pk(pk)?)?;
        tracing::info!(path = %path.display(), "stored proving key");
        Ok(())
    }
}

fn ark(e: impl std::fmt::Display) -> ZkError {
    ZkError::Ark(format!("{e}"))
}

/// Generate a Groth16 proving key for one circuit shape.
pub fn setup_keys(shape: CircuitShape) -> Result<ProvingKey<Bn254>, ZkError> {
    let started = std::time::Instant::now();
    let (pk, _vk) = Groth16::<Bn254>::circuit_specific_setup(AmountsCircuit::dummy(shape), &mut OsRng).map_err(ark)?;
    tracing::info!(?shape, elapsed_ms = started.elapsed().as_millis() as u64, "groth16 setup complete");
    Ok(pk)
}

/// Decoded contents of a proof token.
pub struct AttestationToken {
    pub shape: CircuitShape,
    pub commitment: Fr,
    pub context: Fr,
    pub total: u64,
    pub proof: Proof<Bn254>,
}

impl AttestationToken {
    /// version(1) || discloses_total(1) || slots(u32 le) || commitment || context || [total(u64 le)] || proof
    pub fn to_bytes(&self) -> Result<Vec<u8>, ZkError> {
        let slots = u32::try_from(self.shape.slots).map_err(|_| ZkError::Serialization("too many slots".into()))?;

        let mut out = vec![PROOF_TOKEN_VERSION, u8::from(self.shape.discloses_total)];
        out.extend_from_slice(&slots.to_le_bytes());
        self.commitment
            .serialize_compressed(&mut out)
            .map_err(|e| ZkError::Serialization(format!("{e}")))?;
        self.context
            .serialize_compressed(&mut out)
            .map_err(|e| ZkError::Serialization(format!("{e}")))?;
        if self.shape.discloses_total {
            out.extend_from_slice(&self.total.to_le_bytes());
        }
        self.proof
            .serialize_compressed(&mut out)
            .map_err(|e| ZkError::Serialization(format!("{e}")))?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ZkError> {
        let malformed = |m: &str| ZkError::MalformedToken(m.to_string());

        let (&version, rest) = bytes.split_first().ok_or_else(|| malformed("empty"))?;
        if version != PROOF_TOKEN_VERSION {
            return Err(malformed("unknown version"));
        }
        let (&flag, rest) = rest.split_first().ok_or_else(|| malformed("truncated"))?;
        let discloses_total = match flag {
            0 => false,
            1 => true,
            _ => return Err(malformed("bad shape flag")),
        };
        if rest.len() < 4 {
            return Err(malformed("truncated"));
        }
        let (slots, mut rest) = rest.split_at(4);
        let slots = u32::from_le_bytes([slots[0], slots[1], slots[2], slots[3]]) as usize;
        if slots == 0 || slots > MAX_ATTESTED_SLOTS || !slots.is_power_of_two() {
            return Err(malformed("bad slot count"));
        }

        let commitment = Fr::deserialize_compressed(&mut rest).map_err(|e| ZkError::MalformedToken(format!("{e}")))?;
        let context = Fr::deserialize_compressed(&mut rest).map_err(|e| ZkError::MalformedToken(format!("{e}")))?;
        let total = if discloses_total {
            if rest.len() < 8 {
                return Err(malformed("truncated"));
            }
            let (t, r) = rest.split_at(8);
            rest = r;
            u64::from_le_bytes([t[0], t[1], t[2], t[3], t[4], t[5], t[6], t[7]])
        } else {
            0
        };
        let proof = Proof::<Bn254>::deserialize_compressed(&mut rest).map_err(|e| ZkError::MalformedToken(format!("{e}")))?;
        if !rest.is_empty() {
            return Err(malformed("trailing bytes"));
        }

        Ok(Self { shape: CircuitShape { slots, discloses_total }, commitment, context, total, proof })
    }
}

/// Commit to `amounts` under a fresh blinding factor and prove it, bound to `context`.
pub fn prove_amounts(
    keys: &KeyStore,
    shape: CircuitShape,
    context: Fr,
    amounts: &[u64],
) -> Result<AttestationToken, ZkError> {
    let mut padded = amounts.to_vec();
    padded.resize(shape.slots, 0);

    let total = amounts
        .iter()
        .try_fold(0u64, |acc, a| acc.checked_add(*a))
        .ok_or(ZkError::TotalOverflow)?;

    let mut rng = OsRng;
    let blinding = Fr::rand(&mut rng);
    let commitment = commit_amounts(context, &padded, blinding);

    let circuit = AmountsCircuit {
        shape,
        amounts: padded,
        blinding,
        public_commitment: commitment,
        public_context: context,
        public_total: total,
    };

    let shape_keys = keys.get_or_setup(shape)?;
    let proof = Groth16::<Bn254>::prove(&shape_keys.pk, circuit, &mut rng).map_err(ark)?;

    Ok(AttestationToken { shape, commitment, context, total, proof })
}

/// Verify a decoded token. `Ok(false)` means a well-formed token whose proof does not check out.
pub fn verify_token(keys: &KeyStore, token: &AttestationToken) -> Result<bool, ZkError> {
    let shape_keys = keys.get_existing(token.shape)?.ok_or(ZkError::UnknownShape(token.shape))?;
    let inputs = AmountsCircuit::public_inputs(token.shape, token.commitment, token.context, token.total);
    Groth16::<Bn254>::verify_with_processed_vk(&shape_keys.pvk, &inputs, &token.proof).map_err(ark)
}

pub fn serialize_pk(pk: &ProvingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    pk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, ZkError> {
    ProvingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::context_element;

    fn ctx() -> Fr {
        context_element(b"batch-7")
    }

    #[test]
    fn batch_proof_verifies_and_round_trips() {
        let keys = KeyStore::in_memory();
        let token = prove_amounts(&keys, CircuitShape::batch(3), ctx(), &[1, 2, 3]).unwrap();
        assert_eq!(token.shape.slots, 4);
        assert_eq!(token.total, 6);
        assert!(verify_token(&keys, &token).unwrap());

        let decoded = AttestationToken::from_bytes(&token.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.shape, token.shape);
        assert_eq!(decoded.context, ctx());
        assert_eq!(decoded.total, 6);
        assert!(verify_token(&keys, &decoded).unwrap());
    }

    #[test]
    fn altered_total_fails_verification() {
        let keys = KeyStore::in_memory();
        let mut token = prove_amounts(&keys, CircuitShape::batch(2), ctx(), &[10, 20]).unwrap();
        token.total = 31;
        assert!(!verify_token(&keys, &token).unwrap());
    }

    #[test]
    fn moved_context_fails_verification() {
        let keys = KeyStore::in_memory();
        let mut token = prove_amounts(&keys, CircuitShape::salary(), ctx(), &[5]).unwrap();
        token.context = context_element(b"batch-8");
        assert!(!verify_token(&keys, &token).unwrap());
    }

    #[test]
    fn cached_shapes_stay_available_during_another_setup() {
        let keys = KeyStore::in_memory();
        let token = prove_amounts(&keys, CircuitShape::salary(), ctx(), &[5]).unwrap();

        let pending = keys.slot(CircuitShape::batch(2));
        let _setup_in_progress = lock(&pending);
        assert!(verify_token(&keys, &token).unwrap());
    }

    #[test]
    fn unknown_shape_is_an_error() {
        let keys = KeyStore::in_memory();
        let token = prove_amounts(&keys, CircuitShape::salary(), ctx(), &[5]).unwrap();
        let fresh = KeyStore::in_memory();
        assert!(matches!(verify_token(&fresh, &token), Err(ZkError::UnknownShape(_))));
    }

    #[test]
    fn truncated_tokens_are_malformed() {
        let keys = KeyStore::in_memory();
        let bytes = prove_amounts(&keys, CircuitShape::salary(), ctx(), &[5]).unwrap().to_bytes().unwrap();
        assert!(AttestationToken::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(AttestationToken::from_bytes(&[]).is_err());
        assert!(AttestationToken::from_bytes(&[PROOF_TOKEN_VERSION, 1, 3, 0, 0, 0]).is_err());
    }

    #[test]
    fn persistent_store_reloads_keys() {
        let dir = tempfile::tempdir().unwrap();
        let token = {
            let keys = KeyStore::persistent(dir.path());
            prove_amounts(&keys, CircuitShape::salary(), ctx(), &[99]).unwrap()
        };
        assert!(dir.path().join("groth16_salary_1_pk.bin").exists());

        let reopened = KeyStore::persistent(dir.path());
        assert!(verify_token(&reopened, &token).unwrap());
    }
}
