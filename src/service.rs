//! End-to-end hybrid encryption
//!
//! Encryption draws a fresh symmetric key and nonce, wraps the key under
//! the recipient's RSA public key, and streams the ChaCha20 ciphertext into
//! an envelope. Decryption reverses the steps. No state survives a call:
//! a brand-new key per `encrypt` is what rules out key/nonce reuse, so no
//! bookkeeping across operations is needed.
//!
//! The service holds only its parameters, so one instance (and one loaded
//! key pair) can be shared across threads running independent operations.

use crate::config::CryptoParams;
use crate::envelope::{self, EnvelopeHeader};
use crate::error::{ErrorCategory, ErrorKind, HybridboxError, Result};
use crate::file_ops::{self, AtomicFile, PRIVATE_MODE};
use crate::stream::StreamCipherEngine;
use crate::symmetric::{self, Nonce, SymmetricKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct HybridEncryptionService {
    engine: StreamCipherEngine,
}

impl HybridEncryptionService {
    pub fn new(params: &CryptoParams) -> Result<Self> {
        Ok(Self {
            engine: StreamCipherEngine::new(params)?,
        })
    }

    pub fn engine(&self) -> &StreamCipherEngine {
        &self.engine
    }

    /// Encrypts everything readable from `plaintext` into an envelope
    /// written to `sink`. Returns the envelope size in bytes.
    pub fn encrypt_to<R: Read, W: Write>(
        &self,
        plaintext: R,
        public: &RsaPublicKey,
        sink: &mut W,
    ) -> Result<u64> {
        log::debug!("encrypt: starting");
        // Dropped (and zeroed) on every return path below.
        let key = SymmetricKey::generate()?;
        let nonce = Nonce::generate()?;

        let ciphertext = self.engine.encrypt_stream(&key, &nonce, plaintext)?;
        let wrapped = symmetric::wrap(&key, public)?;
        let header = EnvelopeHeader::new(wrapped, nonce)?;
        let written = envelope::encode(&header, ciphertext, sink)?;

        log::debug!(
            "encrypt: wrote {} byte envelope ({} byte header)",
            written,
            header.encoded_len()
        );
        Ok(written)
    }

    /// Decrypts an envelope read from `source` and writes the plaintext to
    /// `sink`. Returns the plaintext size in bytes.
    pub fn decrypt_to<R: Read, W: Write>(
        &self,
        source: R,
        private: &RsaPrivateKey,
        sink: &mut W,
    ) -> Result<u64> {
        log::debug!("decrypt: starting");
        let envelope = envelope::decode(source)?;
        let key = symmetric::unwrap(envelope.header.wrapped_key(), private)?;

        let mut written = 0u64;
        for chunk in
            self.engine
                .decrypt_stream(&key, envelope.header.nonce(), envelope.ciphertext)?
        {
            let chunk = chunk?;
            sink.write_all(&chunk).map_err(plaintext_write_error)?;
            written += chunk.len() as u64;
        }
        sink.flush().map_err(plaintext_write_error)?;

        log::debug!("decrypt: recovered {} bytes", written);
        Ok(written)
    }

    /// In-memory variant of [`encrypt_to`](Self::encrypt_to).
    pub fn encrypt_bytes(&self, plaintext: &[u8], public: &RsaPublicKey) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encrypt_to(plaintext, public, &mut out)?;
        Ok(out)
    }

    /// In-memory variant of [`decrypt_to`](Self::decrypt_to).
    pub fn decrypt_bytes(&self, envelope: &[u8], private: &RsaPrivateKey) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decrypt_to(envelope, private, &mut out)?;
        Ok(out)
    }

    /// Encrypts `input_path` into an envelope at `output_path`.
    ///
    /// The envelope only appears under `output_path` once it is complete.
    pub fn encrypt_file(
        &self,
        input_path: &Path,
        output_path: &Path,
        public: &RsaPublicKey,
    ) -> Result<u64> {
        let input = file_ops::open_input(input_path)?;
        let mut output = AtomicFile::create(output_path, PRIVATE_MODE)?;
        let written = self
            .encrypt_to(input, public, &mut output)
            .map_err(|e| e.with_context(format!("failed to encrypt {}", input_path.display())))?;
        output
            .commit()
            .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
        log::info!(
            "encrypted {} -> {} ({} bytes)",
            input_path.display(),
            output_path.display(),
            written
        );
        Ok(written)
    }

    /// Decrypts the envelope at `input_path` into `output_path`.
    ///
    /// On any failure, including a wrong private key, nothing is left
    /// under `output_path`.
    pub fn decrypt_file(
        &self,
        input_path: &Path,
        output_path: &Path,
        private: &RsaPrivateKey,
    ) -> Result<u64> {
        let input = file_ops::open_input(input_path)?;
        let mut output = AtomicFile::create(output_path, PRIVATE_MODE)?;
        let written = self
            .decrypt_to(input, private, &mut output)
            .map_err(|e| e.with_context(format!("failed to decrypt {}", input_path.display())))?;
        let target = output.target().display().to_string();
        output
            .commit()
            .map_err(|e| e.with_context(format!("failed to write to {}", target)))?;
        log::info!(
            "decrypted {} -> {} ({} bytes)",
            input_path.display(),
            target,
            written
        );
        Ok(written)
    }
}

fn plaintext_write_error(e: std::io::Error) -> HybridboxError {
    HybridboxError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::Io,
        "failed to write plaintext",
        e,
    )
}
