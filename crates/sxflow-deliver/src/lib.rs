//! Cache-aware delivery of remote transform results.
//!
//! [`Deliverer`] turns a batch of [`SampleDescriptor`](sxflow_resource::SampleDescriptor)s
//! into a [`BatchResult`]. For each sample it fingerprints the descriptor,
//! answers from the local cache when it can, and otherwise submits a
//! transform, polls it to a terminal phase, retrieves its artifacts, and
//! commits them to the cache. Samples sharing a fingerprint converge on one
//! remote submission through the cache's reservations.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//!
//! use sxflow_cache::CacheStore;
//! use sxflow_deliver::{DeliverOptions, Deliverer};
//! use sxflow_remote::{Endpoint, HttpControlPlane, HttpObjectStore, build_client};
//! use sxflow_resource::{DatasetRef, QueryValue, SampleDescriptor};
//!
//! let endpoint = Endpoint { name: "prod".into(), url: "https://servicex.example.org".into(), token: None };
//! let client = build_client(Duration::from_secs(10), Duration::from_secs(60), 32)?;
//! let deliverer = Deliverer::new(
//!     HttpControlPlane::new(&endpoint, client.clone())?,
//!     HttpObjectStore::new(&endpoint, client)?,
//!     CacheStore::open("/tmp/sxflow")?,
//!     DeliverOptions::default(),
//! );
//!
//! let sample = SampleDescriptor::new(
//!     "ttbar",
//!     DatasetRef::did("mc20_13TeV:ttbar"),
//!     QueryValue::text("(call Select (call EventDataset) (lambda (list e) e))"),
//!     "atlasr22",
//! );
//! let results = deliverer.deliver(vec![sample], 100).await?;
//! for artifact in results.get("ttbar").unwrap().artifacts()? {
//!     println!("{:?}", artifact.path());
//! }
//! # Ok(())
//! # }
//! ```

pub use self::deliverer::Deliverer;
pub use self::error::{BatchError, DeliveryError, ErrorKind};
pub use self::options::{DEFAULT_CONCURRENCY_LIMIT, DeliverOptions};
pub use self::poll::{PollPolicy, poll_to_terminal};
pub use self::result::{ArtifactLocation, BatchResult, DeliveredArtifact, SampleResult};

pub mod naming;

mod deliverer;
mod error;
mod options;
mod poll;
mod result;
mod retriever;
mod shared;
