//! Symmetric keys, nonces, and RSA-OAEP key wrapping.

use crate::error::{ErrorCategory, ErrorKind, HybridboxError, Result};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

/// Length of a symmetric key in bytes (ChaCha20-256).
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// Length of a nonce in bytes (IETF ChaCha20).
pub const NONCE_LEN: usize = 12;

/// Bytes of OAEP overhead per wrap: two SHA-256 digests plus two marker bytes.
const OAEP_OVERHEAD: usize = 2 * 32 + 2;

/// A single-use 256-bit key. The bytes are zeroed when the key is dropped,
/// on every exit path.
pub struct SymmetricKey(Zeroizing<[u8; SYMMETRIC_KEY_LEN]>);

impl SymmetricKey {
    /// Draws a fresh key from the operating system CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
        fill_random(&mut key[..], "symmetric key")?;
        Ok(Self(key))
    }

    /// Copies key material out of `bytes`, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; SYMMETRIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            HybridboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidKeyLength,
                format!(
                    "symmetric key must be {} bytes, got {}",
                    SYMMETRIC_KEY_LEN,
                    bytes.len()
                ),
            )
        })?;
        Ok(Self(Zeroizing::new(key)))
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// A 96-bit nonce. Each one is paired with a freshly generated key, so a
/// single random value per operation is enough.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    pub fn generate() -> Result<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        fill_random(&mut nonce, "nonce")?;
        Ok(Self(nonce))
    }

    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Nonce(..)")
    }
}

fn fill_random(buf: &mut [u8], what: &str) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        HybridboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Generation,
            format!("secure random source unavailable while generating {what}"),
            e,
        )
    })
}

/// Largest payload OAEP-SHA256 can carry under `public`.
pub fn wrap_capacity(public: &RsaPublicKey) -> usize {
    public.size().saturating_sub(OAEP_OVERHEAD)
}

/// Encrypts `key` under `public` with RSA-OAEP (SHA-256, MGF1-SHA-256).
///
/// OAEP draws a fresh random seed on every call, so wrapping the same key
/// twice yields different ciphertexts.
pub fn wrap(key: &SymmetricKey, public: &RsaPublicKey) -> Result<Vec<u8>> {
    let capacity = wrap_capacity(public);
    if SYMMETRIC_KEY_LEN > capacity {
        return Err(HybridboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::KeyTooLarge,
            format!(
                "{}-bit modulus can wrap at most {} bytes, symmetric key is {}",
                public.n().bits(),
                capacity,
                SYMMETRIC_KEY_LEN
            ),
        ));
    }

    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| match e {
            rsa::Error::MessageTooLong => HybridboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::KeyTooLarge,
                "symmetric key too large for RSA-OAEP",
                e,
            ),
            other => HybridboxError::with_source(
                ErrorCategory::Internal,
                "RSA-OAEP wrapping failed",
                other,
            ),
        })
}

/// Decrypts a wrapped key.
///
/// The private-key operation is blinded with fresh randomness on every
/// call. Every failure, including a recovered payload of the wrong length,
/// returns the same [`ErrorKind::UnwrapFailed`] error with no source.
pub fn unwrap(wrapped: &[u8], private: &RsaPrivateKey) -> Result<SymmetricKey> {
    let plain = private
        .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), wrapped)
        .map(Zeroizing::new)
        .map_err(|_| unwrap_failed())?;
    SymmetricKey::from_slice(&plain).map_err(|_| unwrap_failed())
}

fn unwrap_failed() -> HybridboxError {
    HybridboxError::with_kind(
        ErrorCategory::User,
        ErrorKind::UnwrapFailed,
        "failed to unwrap symmetric key: wrong private key or corrupt envelope",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::tests::shared_key_pair;

    #[test]
    fn test_generate_keys_differ() {
        let a = SymmetricKey::generate().unwrap();
        let b = SymmetricKey::generate().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_generate_nonces_differ() {
        let a = Nonce::generate().unwrap();
        let b = Nonce::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_slice_wrong_length() {
        let err = SymmetricKey::from_slice(&[0u8; 16]).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::InvalidKeyLength));

        let err = SymmetricKey::from_slice(&[0u8; 33]).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::InvalidKeyLength));
    }

    #[test]
    fn test_debug_redacts() {
        let key = SymmetricKey::from_slice(&[0x41u8; SYMMETRIC_KEY_LEN]).unwrap();
        let debug = format!("{:?}", key);
        assert_eq!(debug, "SymmetricKey([REDACTED])");
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let pair = shared_key_pair();
        let key = SymmetricKey::generate().unwrap();

        let wrapped = wrap(&key, pair.public_key()).unwrap();
        assert_eq!(wrapped.len(), 256);

        let unwrapped = unwrap(&wrapped, pair.private_key()).unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_wrap_is_randomized() {
        let pair = shared_key_pair();
        let key = SymmetricKey::from_slice(&[7u8; SYMMETRIC_KEY_LEN]).unwrap();

        let first = wrap(&key, pair.public_key()).unwrap();
        let second = wrap(&key, pair.public_key()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_capacity_2048() {
        assert_eq!(wrap_capacity(shared_key_pair().public_key()), 190);
    }

    #[test]
    fn test_wrap_key_too_large_for_tiny_modulus() {
        // Far below anything we generate, but loadable from a foreign PEM.
        let tiny = RsaPrivateKey::new(&mut OsRng, 512).unwrap();
        let key = SymmetricKey::generate().unwrap();

        let err = wrap(&key, &tiny.to_public_key()).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::KeyTooLarge));
    }

    #[test]
    fn test_unwrap_with_wrong_key_has_no_source() {
        let pair = shared_key_pair();
        let other = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let key = SymmetricKey::generate().unwrap();
        let wrapped = wrap(&key, pair.public_key()).unwrap();

        // Blinding must not change the result for the right key...
        for _ in 0..3 {
            let unwrapped = unwrap(&wrapped, pair.private_key()).unwrap();
            assert_eq!(unwrapped.as_bytes(), key.as_bytes());
        }

        // ...nor leak anything extra for the wrong one.
        let err = unwrap(&wrapped, &other).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::UnwrapFailed));
        assert!(err.source_error().is_none());
        assert_eq!(err.to_string(), unwrap_failed().to_string());
    }

    #[test]
    fn test_unwrap_failures_are_indistinguishable() {
        let pair = shared_key_pair();
        let key = SymmetricKey::generate().unwrap();
        let wrapped = wrap(&key, pair.public_key()).unwrap();

        let mut flipped = wrapped.clone();
        flipped[100] ^= 0x01;
        let truncated = &wrapped[..wrapped.len() - 1];
        let empty: &[u8] = &[];

        let errors: Vec<HybridboxError> = [&flipped[..], truncated, empty]
            .into_iter()
            .map(|w| unwrap(w, pair.private_key()).unwrap_err())
            .collect();

        for err in &errors {
            assert_eq!(err.kind, Some(ErrorKind::UnwrapFailed));
            assert!(err.source_error().is_none());
            assert_eq!(err.to_string(), errors[0].to_string());
        }
    }
}
