//! Envelope container format
//!
//! The binary layout is:
//! - magic: 4 bytes, `HYBX`
//! - version: 1 byte
//! - wrapped key length: 4 bytes (big-endian u32)
//! - wrapped key: variable length (RSA-OAEP output, at most 512 bytes)
//! - nonce: 12 bytes
//! - ciphertext: remainder of the stream, same length as the plaintext

use crate::config::MAX_MODULUS_BITS;
use crate::error::{ErrorCategory, ErrorKind, HybridboxError, Result};
use crate::symmetric::{NONCE_LEN, Nonce};
use std::io::{self, Read, Write};

pub const MAGIC: &[u8; MAGIC_LEN] = b"HYBX";
pub const MAGIC_LEN: usize = 4;
pub const VERSION_V1: u8 = 1;

/// Size of the big-endian wrapped key length field.
pub const LENGTH_FIELD_LEN: usize = 4;

/// Wrapped keys never exceed one block of the largest supported modulus.
pub const MAX_WRAPPED_KEY_LEN: usize = MAX_MODULUS_BITS / 8;

/// Everything in an envelope that precedes the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    version: u8,
    wrapped_key: Vec<u8>,
    nonce: Nonce,
}

impl EnvelopeHeader {
    pub fn new(wrapped_key: Vec<u8>, nonce: Nonce) -> Result<Self> {
        check_wrapped_key_len(wrapped_key.len())?;
        Ok(Self {
            version: VERSION_V1,
            wrapped_key,
            nonce,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn wrapped_key(&self) -> &[u8] {
        &self.wrapped_key
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Encoded size of the header, i.e. the envelope size minus the ciphertext.
    pub fn encoded_len(&self) -> usize {
        MAGIC_LEN + 1 + LENGTH_FIELD_LEN + self.wrapped_key.len() + NONCE_LEN
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(MAGIC);
        buf.push(self.version);
        // new() bounds the length well below u32::MAX.
        buf.extend_from_slice(&(self.wrapped_key.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.wrapped_key);
        buf.extend_from_slice(self.nonce.as_bytes());
        buf
    }

    /// Reads a header from the front of `source`, leaving it positioned at
    /// the first ciphertext byte.
    pub fn read_from<R: Read>(source: &mut R) -> Result<Self> {
        let mut magic = [0u8; MAGIC_LEN];
        read_field(source, &mut magic, "magic marker")?;
        if &magic != MAGIC {
            return Err(malformed("input unrecognized as hybridbox envelope"));
        }

        let mut version = [0u8; 1];
        read_field(source, &mut version, "version")?;
        if version[0] != VERSION_V1 {
            return Err(malformed(format!(
                "envelope version {} is not supported",
                version[0]
            )));
        }

        let mut length = [0u8; LENGTH_FIELD_LEN];
        read_field(source, &mut length, "wrapped key length")?;
        let wrapped_key_len = u32::from_be_bytes(length) as usize;
        check_wrapped_key_len(wrapped_key_len)?;

        let mut wrapped_key = vec![0u8; wrapped_key_len];
        read_field(source, &mut wrapped_key, "wrapped key")?;

        let mut nonce = [0u8; NONCE_LEN];
        read_field(source, &mut nonce, "nonce")?;

        Ok(Self {
            version: version[0],
            wrapped_key,
            nonce: Nonce::from_bytes(nonce),
        })
    }
}

/// A decoded envelope: the parsed header plus the unread ciphertext.
pub struct Envelope<R> {
    pub header: EnvelopeHeader,
    pub ciphertext: R,
}

/// Writes `header`, then every ciphertext chunk verbatim. Returns the total
/// number of bytes written.
pub fn encode<W, I>(header: &EnvelopeHeader, ciphertext: I, sink: &mut W) -> Result<u64>
where
    W: Write,
    I: IntoIterator<Item = Result<Vec<u8>>>,
{
    let head = header.to_bytes();
    sink.write_all(&head).map_err(write_error)?;
    let mut written = head.len() as u64;

    for chunk in ciphertext {
        let chunk = chunk?;
        sink.write_all(&chunk).map_err(write_error)?;
        written += chunk.len() as u64;
    }
    sink.flush().map_err(write_error)?;
    Ok(written)
}

/// Parses the header and hands back the rest of `source` as the lazy
/// ciphertext.
pub fn decode<R: Read>(mut source: R) -> Result<Envelope<R>> {
    let header = EnvelopeHeader::read_from(&mut source)?;
    Ok(Envelope {
        header,
        ciphertext: source,
    })
}

fn check_wrapped_key_len(len: usize) -> Result<()> {
    if len == 0 || len > MAX_WRAPPED_KEY_LEN {
        return Err(malformed(format!(
            "wrapped key length {} outside 1..={}",
            len, MAX_WRAPPED_KEY_LEN
        )));
    }
    Ok(())
}

fn read_field<R: Read>(source: &mut R, buf: &mut [u8], field: &str) -> Result<()> {
    source.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            malformed(format!("envelope truncated while reading {field}"))
        } else {
            HybridboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to read envelope {field}"),
                e,
            )
        }
    })
}

fn malformed(msg: impl Into<String>) -> HybridboxError {
    HybridboxError::with_kind(ErrorCategory::User, ErrorKind::MalformedEnvelope, msg)
}

fn write_error(e: io::Error) -> HybridboxError {
    HybridboxError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::Io,
        "failed to write envelope",
        e,
    )
}
