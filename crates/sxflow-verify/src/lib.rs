//! Verification of delivered artifacts.
//!
//! A download is complete only when its byte count and, when the object
//! store publishes one, its SHA-256 digest match. [`StreamVerifier`] checks
//! both while the bytes stream to disk; [`verify_file`] re-checks a file that
//! is already in place, which the cache uses to detect vanished or truncated
//! artifacts.
//!
//! ```
//! use sxflow_verify::{Expectation, Sha256Hasher, StreamVerifier};
//!
//! let data = b"hello world";
//! let expected = Expectation::size(11)
//!     .with_sha256_hex(&Sha256Hasher::hex_digest(data))
//!     .unwrap();
//!
//! let mut verifier = StreamVerifier::new();
//! verifier.update(data);
//! verifier.finish(&expected).unwrap();
//! ```

pub use self::check::{Expectation, StreamVerifier, verify_file};
pub use self::error::{Result, VerificationError};
pub use self::hasher::{Hasher, Sha256Hasher};

mod check;
mod error;
mod hasher;
