//! Local cache of delivered transform results.
//!
//! The store maps a sample [`Fingerprint`](sxflow_resource::Fingerprint) to a
//! [`CacheRecord`]. A record is created in flight by
//! [`CacheStore::reserve`], which enforces at most one live delivery per
//! fingerprint across threads and processes, and becomes valid only through
//! [`ReservationGuard::commit`]. Failed deliveries call
//! [`ReservationGuard::release`] and leave nothing behind.
//!
//! Reservations survive crashes safely: the per-fingerprint lock dies with
//! its process, and the next [`reserve`](CacheStore::reserve) takes the
//! orphaned record over instead of waiting on it forever.
//!
//! The store is synchronous. Async callers run it on a blocking pool.

pub use self::error::{CacheError, Result};
pub use self::record::{CacheRecord, CachedFile, CodegenEntry, RecordMeta, RecordStatus};
pub use self::store::{CacheStore, Reservation, ReservationGuard};

mod error;
mod record;
mod store;
