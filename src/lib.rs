//! Hybridbox - hybrid file encryption
//!
//! A fresh ChaCha20 key encrypts each file in bounded-memory chunks, and
//! that key is wrapped with RSA-OAEP under a long-lived key pair. The
//! wrapped key, nonce and ciphertext travel together in one envelope.

#![forbid(unsafe_code)]

pub mod config;
pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod keypair;
pub mod service;
pub mod stream;
pub mod symmetric;

pub use config::{CryptoParams, Settings};
pub use error::{ErrorCategory, ErrorKind, HybridboxError, Result};
pub use keypair::KeyPair;
pub use service::HybridEncryptionService;
pub use stream::StreamCipherEngine;
pub use symmetric::{Nonce, SymmetricKey};
