//! Payment integrity verification.
//!
//! Payment gateways authenticate messages with a lowercase hex HMAC-SHA256
//! digest over a canonical string that both sides rebuild independently.
//! This module signs and verifies those digests. How the canonical string is
//! assembled belongs to each gateway integration, expressed through
//! [`CanonicalPayload`].

use std::fmt;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Separator placed between a digest and its salt index.
pub const SALT_INDEX_SEPARATOR: &str = "###";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("signing secret is empty")]
    EmptySecret,

    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// Types that render the exact string a gateway signs.
///
/// Implementations must be byte-for-byte reproducible: the gateway rebuilds
/// the same string on its side before hashing.
pub trait CanonicalPayload {
    fn canonical_string(&self) -> String;
}

/// A digest suffixed with the salt index that identifies the secret version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaltedChecksum {
    pub digest: String,
    pub salt_index: u32,
}

impl fmt::Display for SaltedChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.digest, SALT_INDEX_SEPARATOR, self.salt_index
        )
    }
}

/// HMAC-SHA256 signer/verifier bound to one shared secret.
///
/// The secret is validated once at construction, so signing never fails
/// afterwards. Cloning is cheap and the value is `Send + Sync`.
#[derive(Clone)]
pub struct PaymentIntegrityVerifier {
    mac: HmacSha256,
}

impl fmt::Debug for PaymentIntegrityVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentIntegrityVerifier")
            .finish_non_exhaustive()
    }
}

impl PaymentIntegrityVerifier {
    /// Build a verifier from a configured secret.
    pub fn new(secret: &Secret<String>) -> Result<Self, IntegrityError> {
        Self::from_key(secret.expose_secret().as_bytes())
    }

    fn from_key(key: &[u8]) -> Result<Self, IntegrityError> {
        if key.is_empty() {
            return Err(IntegrityError::EmptySecret);
        }

        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| IntegrityError::InvalidKey(e.to_string()))?;

        Ok(Self { mac })
    }

    /// Lowercase hex HMAC-SHA256 of `canonical`.
    pub fn sign(&self, canonical: impl AsRef<[u8]>) -> String {
        let mut mac = self.mac.clone();
        mac.update(canonical.as_ref());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn sign_payload<P>(&self, payload: &P) -> String
    where
        P: CanonicalPayload + ?Sized,
    {
        self.sign(payload.canonical_string())
    }

    pub fn sign_salted(&self, canonical: impl AsRef<[u8]>, salt_index: u32) -> SaltedChecksum {
        SaltedChecksum {
            digest: self.sign(canonical),
            salt_index,
        }
    }

    /// Recompute the signature of `canonical` and compare it to `supplied`
    /// in constant time.
    pub fn verify(&self, canonical: impl AsRef<[u8]>, supplied: &str) -> bool {
        constant_time_eq(&self.sign(canonical), supplied)
    }

    pub fn verify_payload<P>(&self, payload: &P, supplied: &str) -> bool
    where
        P: CanonicalPayload + ?Sized,
    {
        self.verify(payload.canonical_string(), supplied)
    }

    /// Verify a `digest###index` checksum. The index must match as well.
    pub fn verify_salted(
        &self,
        canonical: impl AsRef<[u8]>,
        salt_index: u32,
        supplied: &str,
    ) -> bool {
        let expected = self.sign_salted(canonical, salt_index).to_string();
        constant_time_eq(&expected, supplied)
    }
}

/// Sign `canonical` with `secret`.
pub fn sign(canonical: impl AsRef<[u8]>, secret: &str) -> Result<String, IntegrityError> {
    Ok(PaymentIntegrityVerifier::from_key(secret.as_bytes())?.sign(canonical))
}

/// Verify `supplied` against the signature of `canonical` under `secret`.
///
/// An empty secret yields `false` rather than an error.
pub fn verify(canonical: impl AsRef<[u8]>, secret: &str, supplied: &str) -> bool {
    match PaymentIntegrityVerifier::from_key(secret.as_bytes()) {
        Ok(verifier) => verifier.verify(canonical, supplied),
        Err(_) => false,
    }
}

fn constant_time_eq(expected: &str, supplied: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let supplied_bytes = supplied.as_bytes();

    if expected_bytes.len() != supplied_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(supplied_bytes).into()
}
