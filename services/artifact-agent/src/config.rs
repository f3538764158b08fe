//! Configuration for the artifact agent.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nimbus_coordination::StoreLayout;

use crate::context::FlushConfig;
use crate::repository::CachedRepositoryConfig;
use crate::sync::{HttpFetcherConfig, ReconcilerConfig};

/// Name of the cache directory under the local dir.
pub const CACHE_DIR_NAME: &str = "nimbus";

/// Artifact agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local state directory. The artifact cache lives at `<local_dir>/nimbus`.
    pub local_dir: PathBuf,

    /// Interval between reconciliation passes.
    pub storage_loop_interval: Duration,

    /// Jobs installed concurrently within one pass.
    pub max_concurrent_installs: usize,

    /// Root path of the scheduler's nodes in the coordination store.
    pub coordination_root: String,

    /// Directory backing the filesystem coordination store.
    pub coordination_dir: PathBuf,

    /// Leader URL artifacts are downloaded from. `file://` URLs are read
    /// directly from a local or shared mount.
    pub leader_url: String,

    /// Optional bearer token for the leader.
    pub leader_token: Option<String>,

    /// Per-file download timeout.
    pub download_timeout: Duration,

    /// Interval between context flushes.
    pub context_flush_interval: Duration,

    /// When set, artifacts live on this shared mount and no sync loop runs.
    pub shared_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let local_dir = var("NIMBUS_LOCAL_DIR")
            .or_else(|| var("STORM_LOCAL_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("storm-local"));

        let storage_loop_interval = secs(var("NIMBUS_STORAGE_LOOP_SECS"), "NIMBUS_STORAGE_LOOP_SECS", 2)?;
        let max_concurrent_installs: usize =
            parse(var("NIMBUS_MAX_CONCURRENT_INSTALLS"), "NIMBUS_MAX_CONCURRENT_INSTALLS", 4)?;
        if max_concurrent_installs == 0 {
            bail!("NIMBUS_MAX_CONCURRENT_INSTALLS must be at least 1");
        }

        let coordination_root =
            var("NIMBUS_COORDINATION_ROOT").unwrap_or_else(|| "/storm".to_string());
        let coordination_dir = var("NIMBUS_COORDINATION_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| local_dir.join("coordination"));

        let leader_url =
            var("NIMBUS_LEADER_URL").unwrap_or_else(|| "http://127.0.0.1:6627".to_string());
        let leader_token = var("NIMBUS_LEADER_TOKEN");
        let download_timeout = secs(
            var("NIMBUS_DOWNLOAD_TIMEOUT_SECS"),
            "NIMBUS_DOWNLOAD_TIMEOUT_SECS",
            60,
        )?;
        let context_flush_interval =
            secs(var("NIMBUS_CONTEXT_FLUSH_SECS"), "NIMBUS_CONTEXT_FLUSH_SECS", 2)?;

        let shared_dir = var("NIMBUS_SHARED_DIR").map(PathBuf::from);
        let log_level = var("NIMBUS_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            local_dir,
            storage_loop_interval,
            max_concurrent_installs,
            coordination_root,
            coordination_dir,
            leader_url,
            leader_token,
            download_timeout,
            context_flush_interval,
            shared_dir,
            log_level,
        })
    }

    /// Root of the per-node artifact cache.
    pub fn cache_root(&self) -> PathBuf {
        self.local_dir.join(CACHE_DIR_NAME)
    }

    pub fn store_layout(&self) -> Result<StoreLayout> {
        StoreLayout::new(&self.coordination_root)
            .with_context(|| format!("invalid coordination root {:?}", self.coordination_root))
    }

    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            interval: self.storage_loop_interval,
            max_concurrent_installs: self.max_concurrent_installs,
        }
    }

    pub fn cached_repository(&self) -> Result<CachedRepositoryConfig> {
        Ok(CachedRepositoryConfig {
            root: self.cache_root(),
            layout: self.store_layout()?,
            reconciler: self.reconciler(),
        })
    }

    pub fn fetcher(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            base_url: self.leader_url.clone(),
            auth_token: self.leader_token.clone(),
            timeout: self.download_timeout,
        }
    }

    pub fn flush(&self) -> FlushConfig {
        FlushConfig {
            interval: self.context_flush_interval,
        }
    }

    /// Local directory the leader URL points at, for `file://` URLs.
    pub fn leader_path(&self) -> Option<PathBuf> {
        self.leader_url.strip_prefix("file://").map(PathBuf::from)
    }
}

fn parse<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn secs(value: Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs: u64 = parse(value, key, default)?;
    if secs == 0 {
        bail!("{key} must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}
