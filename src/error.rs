use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The secure randomness source was unavailable, or key generation
    /// parameters were rejected.
    Generation,
    /// A serialized key was malformed or used an unsupported encoding.
    Format,
    /// The symmetric key does not fit under the modulus and OAEP padding.
    KeyTooLarge,
    /// The wrapped symmetric key could not be recovered.
    ///
    /// Deliberately undifferentiated: wrong private key, malformed
    /// ciphertext and padding failure all look identical to the caller.
    UnwrapFailed,
    /// Symmetric key material was not exactly 32 bytes.
    InvalidKeyLength,
    /// Bad magic, unsupported version, or a declared length that the
    /// envelope cannot satisfy.
    MalformedEnvelope,
    /// The ChaCha20 block counter would wrap for this key/nonce pair.
    KeystreamExhausted,
    /// Settings or crypto parameters were invalid.
    Config,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

impl ErrorKind {
    /// Process exit code for this kind. Every kind maps to a distinct,
    /// non-zero value; errors without a kind exit with 1.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Generation => 10,
            ErrorKind::Format => 11,
            ErrorKind::KeyTooLarge => 12,
            ErrorKind::UnwrapFailed => 13,
            ErrorKind::InvalidKeyLength => 14,
            ErrorKind::MalformedEnvelope => 15,
            ErrorKind::KeystreamExhausted => 16,
            ErrorKind::Config => 17,
            ErrorKind::Io => 18,
        }
    }
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct HybridboxError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl HybridboxError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that retains the originating source error.
    pub fn with_source(
        category: ErrorCategory,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: None,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Exit code a command-line front end should use for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind.map_or(1, ErrorKind::exit_code)
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, HybridboxError>;
