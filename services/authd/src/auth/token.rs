//! Token minting and parsing.
//!
//! # Purpose
//! Turns a [`Key`] into a compact EdDSA JWS and back. The tokenizer knows
//! nothing about persistence; record checks for Recovery and API keys happen
//! in the auth service.
//!
//! # Key invariants
//! - Tokens are always EdDSA; other algorithms fail verification.
//! - `iss` must equal the configured issuer and `sub` must be present.
//! - `exp` is optional (API keys may never expire) and is checked against the
//!   injected clock with the configured leeway. `iat` is never leeway-adjusted.
//! - Encoding and decoding key material is derived once at construction.
//!
//! # Claims
//! `{iss, sub, type, iat, exp?, jti?}`. `jti` is the record ID of persisted
//! keys.
use crate::auth::clock::Clock;
use crate::auth::keys::SigningKey;
use crate::model::{Key, KeyType};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Errors produced by token minting or parsing.
#[derive(Debug)]
pub enum TokenError {
    /// Signing key material is unusable.
    Key(String),
    /// Encoding a token failed.
    Jwt(jsonwebtoken::errors::Error),
    /// The signature does not verify against the configured key.
    InvalidSignature,
    /// Not a token this issuer produced: bad encoding, wrong issuer, missing claims.
    Malformed(jsonwebtoken::errors::Error),
    /// The `type` claim is not a known key type.
    InvalidKeyType(String),
    /// Signature is valid but `exp` has passed. Carries the decoded key.
    Expired(Box<Key>),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Key(err) => write!(f, "key error: {err}"),
            TokenError::Jwt(err) => write!(f, "jwt error: {err}"),
            TokenError::InvalidSignature => write!(f, "invalid token signature"),
            TokenError::Malformed(err) => write!(f, "malformed token: {err}"),
            TokenError::InvalidKeyType(value) => write!(f, "invalid key type {value:?}"),
            TokenError::Expired(_) => write!(f, "token expired"),
        }
    }
}

impl std::error::Error for TokenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TokenError::Jwt(err) | TokenError::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        TokenError::Jwt(value)
    }
}

pub struct Tokenizer {
    issuer: String,
    kid: String,
    leeway: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl Tokenizer {
    pub fn new(
        key: SigningKey,
        issuer: impl Into<String>,
        leeway_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        // Step 1: Refuse unusable key material up front.
        key.validate()?;
        let issuer = issuer.into();
        let leeway = i64::try_from(leeway_secs)
            .map_err(|_| TokenError::Key(format!("clock leeway {leeway_secs}s out of range")))?;

        // Step 2: jsonwebtoken takes EdDSA private keys as PKCS8 DER and
        // public keys as the base64url `x` JWK component.
        let der = Ed25519SigningKey::from_bytes(&key.private_key)
            .to_pkcs8_der()
            .map_err(|err| TokenError::Key(format!("encode Ed25519 key: {err}")))?;
        let encoding_key = EncodingKey::from_ed_der(der.as_bytes());
        let x = URL_SAFE_NO_PAD.encode(key.public_key);
        let decoding_key = DecodingKey::from_ed_components(&x).map_err(TokenError::Jwt)?;

        // Step 3: Signature, algorithm and issuer are checked by jsonwebtoken.
        // Expiry is optional in our claims, so it is checked by `parse`.
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "iss"]);
        validation.set_issuer(&[issuer.as_str()]);

        Ok(Self {
            issuer,
            kid: key.kid,
            leeway,
            encoding_key,
            decoding_key,
            validation,
            clock,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn issue(&self, key: &Key) -> Result<String, TokenError> {
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: key.subject.clone(),
            key_type: key.key_type.as_str().to_string(),
            iat: key.issued_at,
            exp: key.expires_at,
            jti: (!key.id.is_empty()).then(|| key.id.clone()),
        };
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        Ok(jsonwebtoken::encode(&header, &claims, &self.encoding_key)?)
    }

    /// Verify a token and decode it into a [`Key`].
    ///
    /// The returned key's `issuer_id` is the subject; persisted keys carry
    /// their real issuer in the stored record.
    pub fn parse(&self, token: &str) -> Result<Key, TokenError> {
        // Step 1: Signature first, so nothing from a forged token is trusted.
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(err),
            })?;
        let claims = data.claims;

        // Step 2: Map the claims onto the key model.
        let key_type = KeyType::from_str(&claims.key_type)
            .map_err(|_| TokenError::InvalidKeyType(claims.key_type.clone()))?;
        let key = Key {
            id: claims.jti.unwrap_or_default(),
            key_type,
            issuer_id: claims.sub.clone(),
            subject: claims.sub,
            issued_at: claims.iat,
            expires_at: claims.exp,
        };

        // Step 3: Expiry with skew leeway.
        if key.is_expired(self.clock.now() - self.leeway) {
            return Err(TokenError::Expired(Box::new(key)));
        }
        Ok(key)
    }
}
