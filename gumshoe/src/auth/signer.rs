//! Signature schemes for link tokens.
//!
//! [`HmacSigner`] is deterministic: the signature is HMAC-SHA-256 of the
//! canonical payload keyed by the secret, hex-encoded. [`Argon2Signer`] is
//! salted: the signature is a PHC-encoded Argon2id hash of the payload plus the
//! secret, and verification re-derives the hash from the embedded salt.

use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use super::AuthError;
use super::token::SignaturePayload;

type HmacSha256 = Hmac<Sha256>;

/// Produces and checks token signatures.
#[async_trait]
pub trait SignatureScheme: Send + Sync {
    async fn sign(&self, payload: &SignaturePayload<'_>) -> Result<String, AuthError>;

    /// `Ok(false)` for any signature that does not match, including ones that
    /// cannot be decoded. `Err` only for internal failures.
    async fn verify(
        &self,
        payload: &SignaturePayload<'_>,
        signature: &str,
    ) -> Result<bool, AuthError>;
}

/// HMAC-SHA-256 signer.
pub struct HmacSigner {
    key: Arc<[u8]>,
}

impl HmacSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let key = secret.as_ref();
        if key.is_empty() {
            return Err(AuthError::Signing("secret must not be empty".to_string()));
        }
        Ok(Self { key: key.into() })
    }

    fn mac(&self, payload: &SignaturePayload<'_>) -> Result<HmacSha256, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AuthError::Signing(format!("invalid HMAC key: {e}")))?;
        mac.update(payload.canonical_json()?.as_bytes());
        Ok(mac)
    }
}

#[async_trait]
impl SignatureScheme for HmacSigner {
    async fn sign(&self, payload: &SignaturePayload<'_>) -> Result<String, AuthError> {
        Ok(hex::encode(self.mac(payload)?.finalize().into_bytes()))
    }

    async fn verify(
        &self,
        payload: &SignaturePayload<'_>,
        signature: &str,
    ) -> Result<bool, AuthError> {
        let Ok(bytes) = hex::decode(signature) else {
            return Ok(false);
        };
        // Only the lowercase encoding we issue is accepted
        if hex::encode(&bytes) != signature {
            return Ok(false);
        }
        Ok(self.mac(payload)?.verify_slice(&bytes).is_ok())
    }
}

/// Payload hashed by [`Argon2Signer`]; the secret is part of the input.
#[derive(Serialize)]
struct SaltedPayload<'a> {
    email: &'a str,
    expires: i64,
    secret: &'a str,
}

/// Salted Argon2id signer.
pub struct Argon2Signer {
    secret: Arc<str>,
    params: Params,
}

impl Argon2Signer {
    /// Argon2id with OWASP recommended parameters: m=19456 (19 MiB), t=2, p=1.
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        let params = Params::new(19456, 2, 1, None)
            .map_err(|e| AuthError::Signing(format!("Invalid Argon2 params: {e}")))?;
        Self::with_params(secret, params)
    }

    pub fn with_params(secret: impl Into<String>, params: Params) -> Result<Self, AuthError> {
        let secret: String = secret.into();
        if secret.is_empty() {
            return Err(AuthError::Signing("secret must not be empty".to_string()));
        }
        Ok(Self {
            secret: secret.into(),
            params,
        })
    }

    fn material(&self, payload: &SignaturePayload<'_>) -> Result<Vec<u8>, AuthError> {
        serde_json::to_vec(&SaltedPayload {
            email: payload.email,
            expires: payload.expires,
            secret: &self.secret,
        })
        .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

#[async_trait]
impl SignatureScheme for Argon2Signer {
    async fn sign(&self, payload: &SignaturePayload<'_>) -> Result<String, AuthError> {
        let material = self.material(payload)?;
        let params = self.params.clone();

        tokio::task::spawn_blocking(move || {
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(&material, &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Signing(format!("hashing failed: {e}")))
        })
        .await
        .map_err(|e| AuthError::Signing(format!("hashing task failed: {e}")))?
    }

    async fn verify(
        &self,
        payload: &SignaturePayload<'_>,
        signature: &str,
    ) -> Result<bool, AuthError> {
        let material = self.material(payload)?;
        let signature = signature.to_string();

        tokio::task::spawn_blocking(move || {
            let Ok(parsed) = PasswordHash::new(&signature) else {
                return false;
            };
            // Parameters are read from the hash
            Argon2::default()
                .verify_password(&material, &parsed)
                .is_ok()
        })
        .await
        .map_err(|e| AuthError::Signing(format!("verification task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: &str = "viewer@example.com";

    fn payload(expires: i64) -> SignaturePayload<'static> {
        SignaturePayload {
            email: EMAIL,
            expires,
        }
    }

    fn fast_argon2(secret: &str) -> Argon2Signer {
        Argon2Signer::with_params(secret, Params::new(8, 1, 1, None).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_hmac_is_deterministic() {
        let signer = HmacSigner::new("s3cret").unwrap();

        let a = signer.sign(&payload(1)).await.unwrap();
        let b = signer.sign(&payload(1)).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(signer.verify(&payload(1), &a).await.unwrap());
    }

    #[tokio::test]
    async fn test_hmac_rejects_other_payload_and_key() {
        let signer = HmacSigner::new("s3cret").unwrap();
        let other = HmacSigner::new("other").unwrap();
        let signature = signer.sign(&payload(1)).await.unwrap();

        assert!(!signer.verify(&payload(2), &signature).await.unwrap());
        assert!(!other.verify(&payload(1), &signature).await.unwrap());
    }

    #[tokio::test]
    async fn test_hmac_rejects_non_canonical_encoding() {
        let signer = HmacSigner::new("s3cret").unwrap();
        let signature = signer.sign(&payload(1)).await.unwrap();

        assert!(!signer.verify(&payload(1), &signature.to_uppercase()).await.unwrap());
        assert!(!signer.verify(&payload(1), "not-hex").await.unwrap());
        assert!(!signer.verify(&payload(1), "").await.unwrap());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(HmacSigner::new("").is_err());
        assert!(Argon2Signer::new("").is_err());
    }

    #[tokio::test]
    async fn test_argon2_is_salted_and_verifies() {
        let signer = fast_argon2("s3cret");

        let a = signer.sign(&payload(1)).await.unwrap();
        let b = signer.sign(&payload(1)).await.unwrap();

        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(signer.verify(&payload(1), &a).await.unwrap());
        assert!(signer.verify(&payload(1), &b).await.unwrap());
        assert!(!signer.verify(&payload(2), &a).await.unwrap());
        assert!(!fast_argon2("other").verify(&payload(1), &a).await.unwrap());
        assert!(!signer.verify(&payload(1), "garbage").await.unwrap());
    }
}
