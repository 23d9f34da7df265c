pub mod cache;
pub mod codegens;
pub mod deliver;

use anyhow::{Context, Result};
use sxflow_cache::CacheStore;
use sxflow_deliver::{DeliverOptions, Deliverer};
use sxflow_remote::{HttpControlPlane, HttpObjectStore, build_client};

use crate::config::Config;

pub type HttpDeliverer = Deliverer<HttpControlPlane, HttpObjectStore>;

pub fn open_cache(config: &Config) -> Result<CacheStore> {
    let root = config.cache_root();
    CacheStore::open(&root).with_context(|| format!("cannot open cache at {}", root.display()))
}

/// Build a deliverer talking to the selected endpoint.
pub fn connect(config: &Config, endpoint: Option<&str>, options: DeliverOptions) -> Result<HttpDeliverer> {
    let endpoint = config.endpoint(endpoint)?;
    let client = build_client(config.connect_timeout(), config.read_timeout(), options.max_connections)
        .context("cannot build the HTTP client")?;
    let control = HttpControlPlane::new(endpoint, client.clone())
        .with_context(|| format!("invalid endpoint {}", endpoint.name))?
        .with_request_timeout(config.request_timeout());
    let objects = HttpObjectStore::new(endpoint, client)
        .with_context(|| format!("invalid endpoint {}", endpoint.name))?
        .with_request_timeout(config.request_timeout());
    tracing::debug!(endpoint = %endpoint.name, url = %endpoint.url, "Connecting");

    Ok(Deliverer::new(control, objects, open_cache(config)?, options).with_endpoint(endpoint.name.clone()))
}
