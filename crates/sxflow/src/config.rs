//! Settings file discovery and loading.
//!
//! Values come from the built-in defaults, then the settings file, then
//! `SXFLOW_`-prefixed environment variables. Nested keys use `__`, as in
//! `SXFLOW_RETRY__MAX_ATTEMPTS=8`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use sxflow_deliver::{DEFAULT_CONCURRENCY_LIMIT, DeliverOptions, PollPolicy};
use sxflow_remote::{Endpoint, RetryPolicy};

const CONFIG_FILES: [&str; 2] = ["sxflow.toml", ".sxflow.toml"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoints:            Vec<Endpoint>,
    pub default_endpoint:     Option<String>,
    /// Cache root. `~` and `${USER}` are expanded.
    pub cache_path:           Option<String>,
    pub shorten_filenames:    bool,
    pub concurrency_limit:    usize,
    pub download_concurrency: usize,
    pub max_connections:      usize,
    pub retry:                RetryPolicy,
    pub poll:                 PollPolicy,
    pub fail_if_incomplete:   bool,
    /// Deadline for each control-plane request.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated while reading a response body.
    pub read_timeout_secs:    u64,
    pub log_level:            String,
}

impl Default for Config {
    fn default() -> Self {
        let deliver = DeliverOptions::default();
        Self {
            endpoints:            Vec::new(),
            default_endpoint:     None,
            cache_path:           None,
            shorten_filenames:    false,
            concurrency_limit:    DEFAULT_CONCURRENCY_LIMIT,
            download_concurrency: deliver.download_concurrency,
            max_connections:      deliver.max_connections,
            retry:                deliver.retry,
            poll:                 deliver.poll,
            fail_if_incomplete:   false,
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
            read_timeout_secs:    60,
            log_level:            "info".to_string(),
        }
    }
}

impl Config {
    /// Load from `explicit`, or from the nearest settings file above the
    /// working directory. Returns the file that was used, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let source = match explicit {
            Some(path) => {
                if !path.is_file() {
                    bail!("configuration file {} does not exist", path.display());
                }
                Some(path.to_path_buf())
            }
            None => {
                let cwd = std::env::current_dir().context("cannot read the working directory")?;
                find_config(&cwd)
            }
        };

        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = &source {
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed("SXFLOW_").split("__"))
            .extract()
            .with_context(|| match &source {
                Some(path) => format!("invalid configuration in {}", path.display()),
                None => "invalid configuration".to_string(),
            })?;
        Ok((config, source))
    }

    /// The named endpoint, else `default_endpoint`, else the only one.
    pub fn endpoint(&self, name: Option<&str>) -> Result<&Endpoint> {
        let wanted = name.or(self.default_endpoint.as_deref());
        match wanted {
            Some(wanted) => self
                .endpoints
                .iter()
                .find(|e| e.name == wanted)
                .ok_or_else(|| anyhow!("no endpoint named {wanted:?} is configured")),
            None => match self.endpoints.as_slice() {
                [only] => Ok(only),
                [] => bail!("no endpoints are configured"),
                _ => bail!("several endpoints are configured, pick one with --endpoint"),
            },
        }
    }

    pub fn cache_root(&self) -> PathBuf {
        match &self.cache_path {
            Some(raw) => expand_path(raw),
            None => std::env::temp_dir().join("sxflow"),
        }
    }

    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

    pub fn connect_timeout(&self) -> Duration { Duration::from_secs(self.connect_timeout_secs) }

    pub fn read_timeout(&self) -> Duration { Duration::from_secs(self.read_timeout_secs) }

    pub fn deliver_options(&self) -> DeliverOptions {
        DeliverOptions {
            download_concurrency: self.download_concurrency,
            max_connections: self.max_connections,
            retry: self.retry,
            poll: self.poll.clone(),
            fail_if_incomplete: self.fail_if_incomplete,
            shorten_filenames: self.shorten_filenames,
            ..DeliverOptions::default()
        }
    }
}

/// Search `start` and its ancestors for a settings file.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Expand a leading `~` and any `${USER}` in `raw`.
pub fn expand_path(raw: &str) -> PathBuf {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let raw = raw.replace("${USER}", &user);

    if raw == "~" || raw.starts_with("~/") {
        if let Some(home) = home::home_dir() {
            return home.join(raw[1..].trim_start_matches('/'));
        }
    }
    PathBuf::from(raw)
}
