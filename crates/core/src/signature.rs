//! Signature verification capability.
//!
//! The reference verifier checks RSA PKCS#1 v1.5 signatures over SHA-1 digests, which is
//! what site operators sign the canonical data with. Other schemes can be plugged in through
//! [`SignatureVerifier`].

use rsa::RsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use sha1::Sha1;

use crate::error::SiteKeyError;

/// A public key reconstructed from its DER (SubjectPublicKeyInfo) encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    /// Reconstruct a public key from DER bytes.
    pub fn from_der(der: &[u8]) -> Result<Self, SiteKeyError> {
        let inner = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| SiteKeyError::KeyReconstruction(e.to_string()))?;
        Ok(Self { inner })
    }

    /// The underlying RSA key.
    pub fn as_rsa(&self) -> &RsaPublicKey {
        &self.inner
    }
}

/// Verifies a raw signature over `data` with a public key.
pub trait SignatureVerifier: Send + Sync {
    /// Returns `true` only when `signature` is a valid signature of `data`.
    fn verify(&self, public_key: &PublicKey, data: &[u8], signature: &[u8]) -> bool;
}

/// RSA / SHA-1 / PKCS#1 v1.5 verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaSha1Verifier;

impl SignatureVerifier for RsaSha1Verifier {
    fn verify(&self, public_key: &PublicKey, data: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::try_from(signature) else {
            tracing::debug!(len = signature.len(), "signature bytes rejected");
            return false;
        };
        let verifying_key = VerifyingKey::<Sha1>::new(public_key.inner.clone());
        verifying_key.verify(data, &signature).is_ok()
    }
}
