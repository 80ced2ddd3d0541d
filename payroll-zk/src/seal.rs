//! Amount sealing.
//!
//! ```text
//! key        = blake3_keyed(master_key, SEAL_KEY_DOMAIN || owner)
//! ciphertext = ChaCha20-Poly1305(key, nonce, amount_le, aad = owner)
//! sealed     = base64(version || nonce || ciphertext || tag)
//! ```
//!
//! A fresh random nonce per call means two seals of the same amount never match.

use crate::constants::{SEAL_KEY_DOMAIN, SEAL_VERSION};
use crate::provider::ProviderError;
use crate::types::{Amount, SealedValue};
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const PLAINTEXT_LEN: usize = 8;

/// Exact decoded length of a well-formed sealed value.
pub const SEALED_LEN: usize = 1 + NONCE_LEN + PLAINTEXT_LEN + TAG_LEN;

/// Symmetric sealer holding the provider's master key.
#[derive(Clone)]
pub struct Sealer {
    master_key: [u8; 32],
}

impl Sealer {
    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key }
    }

    /// Per-owner key. Without the master key, knowing the owner identity is not enough.
    fn owner_key(&self, owner: &str) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(&self.master_key);
        hasher.update(SEAL_KEY_DOMAIN);
        hasher.update(owner.as_bytes());
        *hasher.finalize().as_bytes()
    }

    pub fn seal(&self, amount: Amount, owner: &str) -> Result<SealedValue, ProviderError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let cipher = ChaCha20Poly1305::new_from_slice(&self.owner_key(owner))
            .map_err(|e| ProviderError::Failure(format!("seal key: {e}")))?;
        let plaintext = amount.base_units().to_le_bytes();
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload { msg: &plaintext, aad: owner.as_bytes() },
            )
            .map_err(|_| ProviderError::Failure("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(SEALED_LEN);
        out.push(SEAL_VERSION);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);

        Ok(SealedValue(base64::engine::general_purpose::STANDARD.encode(out)))
    }

    pub fn unseal(&self, sealed: &SealedValue, owner: &str) -> Result<Amount, ProviderError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(sealed.as_str())
            .map_err(|e| ProviderError::MalformedSealedValue(format!("invalid base64: {e}")))?;

        if bytes.len() != SEALED_LEN {
            return Err(ProviderError::MalformedSealedValue(format!(
                "expected {SEALED_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0] != SEAL_VERSION {
            return Err(ProviderError::MalformedSealedValue(format!("unknown version {}", bytes[0])));
        }

        let (nonce, ciphertext) = bytes[1..].split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new_from_slice(&self.owner_key(owner))
            .map_err(|e| ProviderError::Failure(format!("seal key: {e}")))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad: owner.as_bytes() })
            .map_err(|_| ProviderError::Failure("sealed value does not open for this owner".to_string()))?;

        let units: [u8; PLAINTEXT_LEN] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| ProviderError::Failure("unexpected plaintext length".to_string()))?;
        Ok(Amount::from_base_units(u64::from_le_bytes(units)))
    }
}
