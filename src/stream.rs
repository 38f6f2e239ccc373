//! Chunked ChaCha20 keystream transform
//!
//! The engine reads its source in fixed-size chunks and yields each
//! transformed chunk as soon as it is available, so memory use is bounded
//! by the chunk size no matter how long the input is.
//!
//! The keystream is IETF ChaCha20 (RFC 8439): 256-bit key, 96-bit nonce,
//! and a 32-bit block counter that starts at zero and advances once per
//! 64-byte block. Chunk boundaries need not be block aligned; the cipher
//! carries partial blocks across chunks.
//!
//! This is confidentiality only. Nothing here detects tampering: flipping a
//! ciphertext bit flips exactly the same plaintext bit.

use crate::config::{CryptoParams, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::error::{ErrorCategory, ErrorKind, HybridboxError, Result};
use crate::symmetric::{Nonce, SymmetricKey};
use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use std::io::{self, Read};

/// Keystream transform engine parameterized by chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCipherEngine {
    chunk_size: usize,
}

impl Default for StreamCipherEngine {
    fn default() -> Self {
        Self {
            chunk_size: CryptoParams::default().chunk_size,
        }
    }
}

impl StreamCipherEngine {
    pub fn new(params: &CryptoParams) -> Result<Self> {
        Self::with_chunk_size(params.chunk_size)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Result<Self> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(HybridboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                format!(
                    "chunk size must be between {} and {} bytes, got {}",
                    MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, chunk_size
                ),
            ));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Lazily encrypts `source`, yielding one ciphertext chunk per source chunk.
    pub fn encrypt_stream<R: Read>(
        &self,
        key: &SymmetricKey,
        nonce: &Nonce,
        source: R,
    ) -> Result<CipherChunks<R>> {
        self.transform(key.as_bytes(), nonce, source)
    }

    /// Lazily decrypts `source`. Identical to encryption: the keystream is
    /// XORed in either direction.
    pub fn decrypt_stream<R: Read>(
        &self,
        key: &SymmetricKey,
        nonce: &Nonce,
        source: R,
    ) -> Result<CipherChunks<R>> {
        self.transform(key.as_bytes(), nonce, source)
    }

    /// Same as [`encrypt_stream`](Self::encrypt_stream) for raw key bytes,
    /// which must be exactly 32 bytes long.
    pub fn transform<R: Read>(&self, key: &[u8], nonce: &Nonce, source: R) -> Result<CipherChunks<R>> {
        let cipher = ChaCha20::new_from_slices(key, nonce.as_bytes()).map_err(|_| {
            HybridboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidKeyLength,
                format!("stream cipher key must be 32 bytes, got {}", key.len()),
            )
        })?;
        Ok(CipherChunks {
            cipher,
            source,
            chunk_size: self.chunk_size,
            done: false,
        })
    }
}

/// Lazy sequence of transformed chunks over a [`Read`] source.
///
/// Every yielded chunk is at most `chunk_size` bytes; only the last one may
/// be shorter. After the first error the iterator is fused.
pub struct CipherChunks<R> {
    cipher: ChaCha20,
    source: R,
    chunk_size: usize,
    done: bool,
}

impl<R> CipherChunks<R> {
    /// Number of bytes transformed so far.
    pub fn bytes_processed(&self) -> u64 {
        self.cipher.current_pos::<u64>()
    }
}

impl<R: Read> Iterator for CipherChunks<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut chunk = vec![0u8; self.chunk_size];
        let filled = match read_full(&mut self.source, &mut chunk) {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Some(Err(HybridboxError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    format!("failed to read stream at byte offset {}", self.bytes_processed()),
                    e,
                )));
            }
        };
        if filled == 0 {
            self.done = true;
            return None;
        }
        chunk.truncate(filled);

        if self.cipher.try_apply_keystream(&mut chunk).is_err() {
            self.done = true;
            return Some(Err(HybridboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::KeystreamExhausted,
                format!(
                    "keystream exhausted at byte offset {}; input exceeds 256 GiB",
                    self.bytes_processed()
                ),
            )));
        }
        Some(Ok(chunk))
    }
}

/// Reads until `buf` is full or the source hits EOF.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetric::{NONCE_LEN, SYMMETRIC_KEY_LEN};

    fn collect(chunks: CipherChunks<&[u8]>) -> Vec<u8> {
        chunks
            .collect::<Result<Vec<_>>>()
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    fn fixed_key() -> SymmetricKey {
        SymmetricKey::from_slice(&[0x11u8; SYMMETRIC_KEY_LEN]).unwrap()
    }

    /// Source that returns at most `step` bytes per read and sometimes
    /// reports EINTR.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
        interrupt: bool,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn test_rfc8439_zero_key_block() {
        // RFC 8439 appendix A.1, test vector #1: all-zero key and nonce,
        // block counter 0.
        let key = SymmetricKey::from_slice(&[0u8; SYMMETRIC_KEY_LEN]).unwrap();
        let nonce = Nonce::from_bytes([0u8; NONCE_LEN]);
        let zeros = [0u8; 64];

        let engine = StreamCipherEngine::default();
        let keystream = collect(engine.encrypt_stream(&key, &nonce, &zeros[..]).unwrap());

        assert_eq!(
            hex::encode(keystream),
            "76b8e0ada0f13d90405d6ae55386bd28bdd219b8a08ded1aa836efcc8b770dc7\
             da41597c5157488d7724e03fb8d84a376a43b8f41518a11cc387b669b2ee6586"
        );
    }

    #[test]
    fn test_roundtrip() {
        let key = fixed_key();
        let nonce = Nonce::from_bytes([3u8; NONCE_LEN]);
        let plaintext: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();

        let engine = StreamCipherEngine::default();
        let ciphertext = collect(engine.encrypt_stream(&key, &nonce, &plaintext[..]).unwrap());
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(ciphertext, plaintext);

        let decrypted = collect(engine.decrypt_stream(&key, &nonce, &ciphertext[..]).unwrap());
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let engine = StreamCipherEngine::default();
        let mut chunks = engine
            .encrypt_stream(&fixed_key(), &Nonce::from_bytes([0u8; NONCE_LEN]), &b""[..])
            .unwrap();
        assert!(chunks.next().is_none());
        assert!(chunks.next().is_none());
    }

    #[test]
    fn test_chunk_size_does_not_change_output() {
        let key = fixed_key();
        let nonce = Nonce::from_bytes([9u8; NONCE_LEN]);
        let plaintext = vec![0x5au8; 50_000];

        // 5000 is not a multiple of the 64-byte block, so the counter has
        // to carry partial blocks across chunk boundaries.
        let small = StreamCipherEngine::with_chunk_size(5000).unwrap();
        let large = StreamCipherEngine::with_chunk_size(MAX_CHUNK_SIZE).unwrap();

        let a = collect(small.encrypt_stream(&key, &nonce, &plaintext[..]).unwrap());
        let b = collect(large.encrypt_stream(&key, &nonce, &plaintext[..]).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_chunks_are_bounded() {
        let engine = StreamCipherEngine::with_chunk_size(MIN_CHUNK_SIZE).unwrap();
        let plaintext = vec![1u8; MIN_CHUNK_SIZE * 3 + 17];
        let source = Trickle {
            data: &plaintext,
            step: 1000,
            interrupt: false,
        };

        let sizes: Vec<usize> = engine
            .encrypt_stream(&fixed_key(), &Nonce::from_bytes([0u8; NONCE_LEN]), source)
            .unwrap()
            .map(|c| c.unwrap().len())
            .collect();

        assert_eq!(sizes, vec![MIN_CHUNK_SIZE, MIN_CHUNK_SIZE, MIN_CHUNK_SIZE, 17]);
    }

    #[test]
    fn test_bytes_processed_tracks_progress() {
        let engine = StreamCipherEngine::with_chunk_size(MIN_CHUNK_SIZE).unwrap();
        let plaintext = vec![0u8; MIN_CHUNK_SIZE + 10];
        let mut chunks = engine
            .encrypt_stream(&fixed_key(), &Nonce::from_bytes([0u8; NONCE_LEN]), &plaintext[..])
            .unwrap();

        assert_eq!(chunks.bytes_processed(), 0);
        chunks.next().unwrap().unwrap();
        assert_eq!(chunks.bytes_processed(), MIN_CHUNK_SIZE as u64);
        chunks.next().unwrap().unwrap();
        assert_eq!(chunks.bytes_processed(), MIN_CHUNK_SIZE as u64 + 10);
    }

    #[test]
    fn test_single_bit_flip_is_local() {
        let key = fixed_key();
        let nonce = Nonce::from_bytes([4u8; NONCE_LEN]);
        let plaintext = b"attack at dawn, attack at dawn".to_vec();
        let engine = StreamCipherEngine::default();

        let mut ciphertext = collect(engine.encrypt_stream(&key, &nonce, &plaintext[..]).unwrap());
        ciphertext[7] ^= 0x80;
        let decrypted = collect(engine.decrypt_stream(&key, &nonce, &ciphertext[..]).unwrap());

        for (i, (d, p)) in decrypted.iter().zip(&plaintext).enumerate() {
            if i == 7 {
                assert_eq!(*d, *p ^ 0x80);
            } else {
                assert_eq!(d, p);
            }
        }
    }

    #[test]
    fn test_invalid_key_length() {
        let engine = StreamCipherEngine::default();
        let err = engine
            .transform(&[0u8; 16], &Nonce::from_bytes([0u8; NONCE_LEN]), &b"x"[..])
            .err()
            .expect("16-byte key must be rejected");
        assert_eq!(err.kind, Some(ErrorKind::InvalidKeyLength));
    }

    #[test]
    fn test_io_error_propagates_and_fuses() {
        let engine = StreamCipherEngine::default();
        let mut chunks = engine
            .encrypt_stream(&fixed_key(), &Nonce::from_bytes([0u8; NONCE_LEN]), Broken)
            .unwrap();

        let err = chunks.next().unwrap().unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Io));
        assert_eq!(err.message(), "failed to read stream at byte offset 0");
        let source = err.source_error().unwrap();
        assert_eq!(source.to_string(), "disk on fire");
        assert!(chunks.next().is_none());
    }

    /// Fails on the first read after `ok` bytes have been delivered.
    struct FailsAfter {
        ok: usize,
    }

    impl Read for FailsAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.ok == 0 {
                return Err(io::Error::other("device went away"));
            }
            let n = self.ok.min(buf.len());
            buf[..n].fill(0);
            self.ok -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_io_error_reports_offset_through_mut_ref() {
        let engine = StreamCipherEngine::with_chunk_size(MIN_CHUNK_SIZE).unwrap();
        let mut chunks = engine
            .encrypt_stream(
                &fixed_key(),
                &Nonce::from_bytes([0u8; NONCE_LEN]),
                FailsAfter { ok: MIN_CHUNK_SIZE },
            )
            .unwrap();

        // Drive the iterator through `&mut`, as `for` loops and adapters do.
        let by_ref = &mut chunks;
        assert_eq!(by_ref.next().unwrap().unwrap().len(), MIN_CHUNK_SIZE);
        let err = by_ref.next().unwrap().unwrap_err();

        assert_eq!(err.kind, Some(ErrorKind::Io));
        assert_eq!(
            err.message(),
            format!("failed to read stream at byte offset {}", MIN_CHUNK_SIZE)
        );
        assert_eq!(by_ref.bytes_processed(), MIN_CHUNK_SIZE as u64);
    }

    #[test]
    fn test_rejects_out_of_range_chunk_size() {
        assert!(StreamCipherEngine::with_chunk_size(0).is_err());
        assert!(StreamCipherEngine::with_chunk_size(MAX_CHUNK_SIZE + 1).is_err());
    }
}
