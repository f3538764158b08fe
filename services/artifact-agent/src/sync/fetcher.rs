//! Artifact download from the leader.
//!
//! The leader serves each job's artifacts from its `master_code_dir`. The
//! fetcher writes one file at a time into a staging directory; atomicity of
//! the whole install is the installer's concern.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Errors from a single file download.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("artifact not found on leader: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("download timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

/// Downloads one artifact file from the leader into `dest`.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Copy `<source_dir>/<file_name>` to `dest`, returning bytes written.
    async fn fetch(&self, source_dir: &str, file_name: &str, dest: &Path)
        -> Result<u64, FetchError>;
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Leader base URL, e.g. `http://nimbus-1:6627`.
    pub base_url: String,
    /// Optional bearer token.
    pub auth_token: Option<String>,
    /// Per-file timeout, covering connect and body.
    pub timeout: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:6627".to_string(),
            auth_token: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Fetches artifacts over HTTP from the leader.
pub struct HttpFetcher {
    config: HttpFetcherConfig,
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// URL of one artifact file.
    pub fn url_for(&self, source_dir: &str, file_name: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let dir = source_dir.trim_matches('/');
        if dir.is_empty() {
            format!("{base}/{file_name}")
        } else {
            format!("{base}/{dir}/{file_name}")
        }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(
        &self,
        source_dir: &str,
        file_name: &str,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let url = self.url_for(source_dir, file_name);
        debug!(url = %url, dest = %dest.display(), "Fetching artifact");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| classify(&url, e))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound(url)),
            status => {
                return Err(FetchError::Status {
                    url,
                    status: status.as_u16(),
                })
            }
        }

        let mut file = fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify(&url, e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.sync_all().await?;

        Ok(written)
    }
}

fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::Http(err)
    }
}

/// Copies artifacts from a leader directory on a local or shared mount.
#[derive(Debug, Clone, Default)]
pub struct LocalFetcher {
    base: Option<PathBuf>,
}

impl LocalFetcher {
    /// Resolve source directories as absolute paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve source directories under `base`.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn source_path(&self, source_dir: &str, file_name: &str) -> PathBuf {
        match &self.base {
            Some(base) => base.join(source_dir.trim_start_matches('/')).join(file_name),
            None => Path::new(source_dir).join(file_name),
        }
    }
}

#[async_trait]
impl ArtifactFetcher for LocalFetcher {
    async fn fetch(
        &self,
        source_dir: &str,
        file_name: &str,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let source = self.source_path(source_dir, file_name);
        debug!(source = %source.display(), dest = %dest.display(), "Copying artifact");

        match fs::copy(&source, dest).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(source.display().to_string()))
            }
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}
