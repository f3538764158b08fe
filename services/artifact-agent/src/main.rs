//! Nimbus artifact agent
//!
//! Runs on every scheduler replica and keeps the local job artifact cache in
//! sync with the assignments in the coordination store, so a replica taking
//! over leadership can serve every active job immediately.
//!
//! ## Architecture
//!
//! - **Repository**: shared mount, or local cache driven by the reconciliation loop
//! - **Context flush**: persists buffered task context to the coordination store

use std::sync::Arc;

use anyhow::{Context, Result};
use nimbus_artifact_agent::config::Config;
use nimbus_artifact_agent::repository::{ArtifactRepository, CachedRepository, SharedRepository};
use nimbus_artifact_agent::sync::{ArtifactFetcher, HttpFetcher, LocalFetcher};
use nimbus_artifact_agent::ContextAggregator;
use nimbus_coordination::{CoordinationStore, FsStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting nimbus artifact agent");
    info!(
        local_dir = %config.local_dir.display(),
        coordination_root = %config.coordination_root,
        coordination_dir = %config.coordination_dir.display(),
        leader_url = %config.leader_url,
        shared = config.shared_dir.is_some(),
        "Configuration loaded"
    );

    let store: Arc<dyn CoordinationStore> = Arc::new(FsStore::new(&config.coordination_dir));
    let layout = config.store_layout()?;

    let mut cached = None;
    let repository: Arc<dyn ArtifactRepository> = match &config.shared_dir {
        Some(dir) => Arc::new(SharedRepository::new(dir)),
        None => {
            let fetcher: Arc<dyn ArtifactFetcher> = match config.leader_path() {
                Some(path) => Arc::new(LocalFetcher::with_base(path)),
                None => Arc::new(
                    HttpFetcher::new(config.fetcher()).context("failed to build HTTP client")?,
                ),
            };
            let repo = Arc::new(CachedRepository::new(
                config.cached_repository()?,
                Arc::clone(&store),
                fetcher,
            ));
            cached = Some(Arc::clone(&repo));
            repo
        }
    };

    repository
        .init()
        .await
        .context("failed to initialize artifact repository")?;
    info!(
        distributed = repository.is_support_distributed(),
        "Artifact repository initialized"
    );

    let context = Arc::new(ContextAggregator::new());
    context
        .start_flush(Arc::clone(&store), layout, config.flush())
        .context("failed to start context flush")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    if let Some(repo) = cached {
        repo.shutdown().await;
    }
    context.stop_flush().await;

    info!("Artifact agent shutdown complete");
    Ok(())
}
