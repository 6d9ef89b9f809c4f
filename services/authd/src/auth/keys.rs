//! Ed25519 signing key material for issued tokens.
//!
//! # Key invariants
//! - Keys are always Ed25519; `alg` is fixed to EdDSA.
//! - The private key is a raw 32-byte seed (not PKCS8 DER), and the public key
//!   is derived from that seed.
//! - Private key material is never serialized or logged. `Debug` redacts it.
//!
//! # How to use
//! Load a configured seed with [`SigningKey::from_seed_hex`] or call
//! [`generate_signing_key`] for an ephemeral key, then hand the value to
//! [`crate::auth::Tokenizer::new`]. The key is immutable from then on.
use crate::auth::token::TokenError;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use jsonwebtoken::Algorithm;
use rand::RngCore;

pub(crate) const ED25519_KEY_LEN: usize = 32;

#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub alg: Algorithm,
    pub private_key: [u8; ED25519_KEY_LEN],
    pub public_key: [u8; ED25519_KEY_LEN],
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("private_key", &"<redacted>")
            .field("public_key", &hex::encode(self.public_key))
            .finish()
    }
}

impl SigningKey {
    /// Build a key from a 32-byte seed, deriving the public half.
    pub fn from_seed(kid: impl Into<String>, seed: [u8; ED25519_KEY_LEN]) -> Self {
        let public_key = Ed25519SigningKey::from_bytes(&seed)
            .verifying_key()
            .to_bytes();
        Self {
            kid: kid.into(),
            alg: Algorithm::EdDSA,
            private_key: seed,
            public_key,
        }
    }

    /// Parse a hex-encoded 32-byte seed, as read from configuration.
    pub fn from_seed_hex(kid: impl Into<String>, seed_hex: &str) -> Result<Self, TokenError> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|err| TokenError::Key(format!("signing key is not hex: {err}")))?;
        let seed: [u8; ED25519_KEY_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            TokenError::Key(format!(
                "signing key must be {ED25519_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_seed(kid, seed))
    }

    /// Validate that the key is Ed25519 and internally consistent.
    pub fn validate(&self) -> Result<(), TokenError> {
        // Step 1: Enforce the EdDSA-only invariant.
        if self.alg != Algorithm::EdDSA {
            return Err(TokenError::Key(format!(
                "invalid signing algorithm: {:?}",
                self.alg
            )));
        }
        // Step 2: Confirm the public key matches the private seed.
        let expected = Ed25519SigningKey::from_bytes(&self.private_key)
            .verifying_key()
            .to_bytes();
        if expected != self.public_key {
            return Err(TokenError::Key(
                "Ed25519 public key does not match private seed".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate a fresh Ed25519 signing key with a random `kid`.
pub fn generate_signing_key() -> SigningKey {
    // Step 1: Generate a 32-byte Ed25519 seed.
    let mut seed = [0u8; ED25519_KEY_LEN];
    rand::thread_rng().fill_bytes(&mut seed);

    // Step 2: Generate a random `kid`. It is not a secret.
    let mut kid_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut kid_bytes);

    SigningKey::from_seed(hex::encode(kid_bytes), seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_validate() {
        let key = generate_signing_key();
        key.validate().expect("valid");
        assert_eq!(key.kid.len(), 32);
        assert_ne!(key.private_key, [0u8; ED25519_KEY_LEN]);
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let mut key = SigningKey::from_seed("k1", [7u8; ED25519_KEY_LEN]);
        key.public_key = [0u8; ED25519_KEY_LEN];
        assert!(matches!(key.validate(), Err(TokenError::Key(_))));

        let mut key = SigningKey::from_seed("k1", [7u8; ED25519_KEY_LEN]);
        key.alg = Algorithm::RS256;
        assert!(matches!(key.validate(), Err(TokenError::Key(_))));
    }

    #[test]
    fn seed_hex_must_be_32_bytes() {
        let key = SigningKey::from_seed_hex("k1", &"11".repeat(32)).expect("seed");
        assert_eq!(key.private_key, [0x11u8; ED25519_KEY_LEN]);
        assert!(SigningKey::from_seed_hex("k1", "abcd").is_err());
        assert!(SigningKey::from_seed_hex("k1", "zz").is_err());
    }

    #[test]
    fn debug_redacts_private_key() {
        let key = SigningKey::from_seed("k1", [9u8; ED25519_KEY_LEN]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex::encode([9u8; ED25519_KEY_LEN])));
    }
}
