//! Cryptographic parameters and the optional JSON settings file.

use crate::error::{ErrorCategory, ErrorKind, HybridboxError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Smallest RSA modulus we will generate.
pub const MIN_MODULUS_BITS: usize = 2048;

/// Largest RSA modulus we will generate or accept for wrapping.
pub const MAX_MODULUS_BITS: usize = 4096;

/// Smallest chunk the stream engine will read at a time.
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Largest chunk the stream engine will read at a time.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Algorithm parameters, passed explicitly to key generation and to the
/// stream cipher engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CryptoParams {
    /// RSA modulus size in bits.
    pub modulus_bits: usize,
    /// RSA public exponent.
    pub public_exponent: u64,
    /// Bytes read from the source per stream chunk.
    pub chunk_size: usize,
}

impl Default for CryptoParams {
    fn default() -> Self {
        Self {
            modulus_bits: 2048,
            public_exponent: 65537,
            chunk_size: 64 * 1024,
        }
    }
}

impl CryptoParams {
    /// Checks every parameter against the supported ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&self.modulus_bits) {
            return Err(config_error(format!(
                "modulus size must be between {} and {} bits, got {}",
                MIN_MODULUS_BITS, MAX_MODULUS_BITS, self.modulus_bits
            )));
        }
        if self.public_exponent < 3 || self.public_exponent % 2 == 0 {
            return Err(config_error(format!(
                "public exponent must be odd and at least 3, got {}",
                self.public_exponent
            )));
        }
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(config_error(format!(
                "chunk size must be between {} and {} bytes, got {}",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Settings file contents. Every path is optional so command-line
/// arguments can fill in or override any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub private_key: Option<PathBuf>,
    pub public_key: Option<PathBuf>,
    pub input_file: Option<PathBuf>,
    pub encrypted_output: Option<PathBuf>,
    pub decrypted_output: Option<PathBuf>,
    pub params: CryptoParams,
    /// Older settings files name a standalone symmetric key file. The key
    /// now travels inside each envelope, so the entry is accepted and ignored.
    symmetric_key: Option<PathBuf>,
}

impl Settings {
    /// Parses settings from JSON text and validates the parameters.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json).map_err(|e| {
            HybridboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Config,
                "settings are not valid JSON for this tool",
                e,
            )
        })?;
        settings.params.validate()?;
        if let Some(path) = &settings.symmetric_key {
            log::warn!(
                "ignoring symmetric_key ({}): symmetric keys are stored in each envelope",
                path.display()
            );
        }
        Ok(settings)
    }

    /// Reads and parses a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            HybridboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Config,
                format!("failed to read settings from {}", path.display()),
                e,
            )
        })?;
        log::debug!("loaded settings from {}", path.display());
        Self::from_json(&json)
            .map_err(|e| e.with_context(format!("invalid settings in {}", path.display())))
    }
}

fn config_error(msg: String) -> HybridboxError {
    HybridboxError::with_kind(ErrorCategory::User, ErrorKind::Config, msg)
}
