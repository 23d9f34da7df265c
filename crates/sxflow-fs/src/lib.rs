//! Filesystem primitives shared by the cache store and the artifact retriever.
//!
//! - [`atomic_write`] replaces a file through a sibling temp file and a rename,
//!   so readers never observe a half-written file.
//! - [`LockFile`] is an exclusive, OS-level advisory lock that is released
//!   automatically when the holder exits, including on a crash.
//! - [`Workspace`] is a staging directory whose contents are moved into place
//!   on [`Workspace::commit`] and deleted if dropped uncommitted.

mod atomic;
mod error;
mod lock;
mod workspace;

pub use atomic::{AtomicWriteOptions, atomic_read, atomic_write};
pub use error::{Error, Result};
pub use lock::LockFile;
pub use workspace::Workspace;
