use std::io::Read;
use std::path::Path;

use crate::{Hasher, Result, Sha256Hasher, VerificationError};

/// What a delivered artifact must match before it counts as complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectation {
    pub size:   Option<u64>,
    pub sha256: Option<Vec<u8>>,
}

impl Expectation {
    pub fn size(size: u64) -> Self {
        Self {
            size:   Some(size),
            sha256: None,
        }
    }

    /// Adds a hex-encoded SHA-256 digest.
    pub fn with_sha256_hex(mut self, digest: &str) -> Result<Self> {
        let bytes =
            hex::decode(digest).map_err(|_| VerificationError::InvalidDigest(digest.to_string()))?;
        self.sha256 = Some(bytes);
        Ok(self)
    }
}

/// Counts and hashes bytes as they pass through a download.
///
/// The digest is always computed so a single pass over the data covers both
/// the size and integrity checks.
pub struct StreamVerifier<H = Sha256Hasher> {
    hasher: H,
    bytes:  u64,
}

impl StreamVerifier<Sha256Hasher> {
    pub fn new() -> Self { Self::with_hasher(Sha256Hasher::new()) }
}

impl Default for StreamVerifier<Sha256Hasher> {
    fn default() -> Self { Self::new() }
}

impl<H: Hasher> StreamVerifier<H> {
    pub fn with_hasher(hasher: H) -> Self { Self { hasher, bytes: 0 } }

    pub fn update(&mut self, chunk: &[u8]) {
        self.bytes += chunk.len() as u64;
        self.hasher.update(chunk);
    }

    pub fn bytes(&self) -> u64 { self.bytes }

    /// Check the observed stream against `expected`. Size is checked first.
    pub fn finish(self, expected: &Expectation) -> Result<u64> {
        if let Some(size) = expected.size {
            if size != self.bytes {
                return Err(VerificationError::SizeMismatch {
                    expected: size,
                    actual:   self.bytes,
                });
            }
        }
        let actual = self.hasher.finalize();
        match &expected.sha256 {
            Some(digest) if *digest != actual => Err(VerificationError::Mismatch {
                expected: digest.clone(),
                actual,
            }),
            _ => Ok(self.bytes),
        }
    }
}

/// Re-verify a file already on disk.
pub fn verify_file(path: impl AsRef<Path>, expected: &Expectation) -> Result<u64> {
    let mut file = std::fs::File::open(path.as_ref())?;
    if let (None, Some(size)) = (&expected.sha256, expected.size) {
        let actual = file.metadata()?.len();
        if actual != size {
            return Err(VerificationError::SizeMismatch {
                expected: size,
                actual,
            });
        }
        return Ok(actual);
    }

    let mut verifier = StreamVerifier::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        verifier.update(&buf[..n]);
    }
    verifier.finish(expected)
}
