use anyhow::{Result, bail};
use sxflow_cache::{CacheRecord, RecordStatus};
use sxflow_resource::Fingerprint;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::config::Config;

#[derive(Tabled)]
struct RecordRow {
    fingerprint: String,
    title:       String,
    status:      &'static str,
    transform:   String,
    files:       usize,
    urls:        usize,
    completed:   String,
}

impl From<&CacheRecord> for RecordRow {
    fn from(record: &CacheRecord) -> Self {
        Self {
            fingerprint: record.fingerprint.short().to_string(),
            title:       record.meta.title.clone(),
            status:      match record.status {
                RecordStatus::Valid => "valid",
                RecordStatus::InFlight => "in flight",
            },
            transform:   record.transform_id.clone().unwrap_or_else(|| "-".into()),
            files:       record.files.len(),
            urls:        record.signed_urls.len(),
            completed:   record
                .completed_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".into()),
        }
    }
}

pub fn list(config: &Config) -> Result<()> {
    let records = super::open_cache(config)?.list()?;
    if records.is_empty() {
        println!("cache at {} is empty", config.cache_root().display());
        return Ok(());
    }
    println!("{}", Table::new(records.iter().map(RecordRow::from)).with(Style::rounded()));
    Ok(())
}

/// Accepts a full fingerprint or an unambiguous prefix of one.
pub fn remove(config: &Config, fingerprint: &str) -> Result<()> {
    let store = super::open_cache(config)?;
    let matches: Vec<Fingerprint> = store
        .list()?
        .into_iter()
        .map(|r| r.fingerprint)
        .filter(|fp| fp.as_str().starts_with(fingerprint))
        .collect();
    let fp = match matches.as_slice() {
        [fp] => fp,
        [] => bail!("no cache record matches {fingerprint}"),
        _ => bail!("{fingerprint} matches {} records, give more characters", matches.len()),
    };
    store.remove(fp)?;
    println!("removed {fp}");
    Ok(())
}

pub fn remove_transform(config: &Config, transform_id: &str) -> Result<()> {
    let removed = super::open_cache(config)?.remove_by_transform(transform_id)?;
    println!("removed {removed} record(s) for transform {transform_id}");
    Ok(())
}

pub fn clear(config: &Config) -> Result<()> {
    let removed = super::open_cache(config)?.clear()?;
    println!("removed {removed} record(s)");
    Ok(())
}
