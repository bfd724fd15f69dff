use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, StatusCode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::stream::{UpstreamLease, UpstreamStream};
use crate::config::ArtworkConfig;

/// Content type for cached and buffered remote artwork
pub const JPEG: &str = "image/jpeg";

/// Why a single candidate URL was skipped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptFailure {
    #[error("timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("failed to read body: {0}")]
    Body(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for AttemptFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AttemptFailure::Timeout
        } else if e.is_connect() {
            AttemptFailure::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            AttemptFailure::Body(e.to_string())
        } else if let Some(status) = e.status() {
            AttemptFailure::Status(status.as_u16())
        } else {
            AttemptFailure::Request(e.to_string())
        }
    }
}

/// One candidate tried during a fetch
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub url: String,
    pub result: Result<(), AttemptFailure>,
}

/// Where the served artwork came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkSource {
    Cache,
    Remote { url: String },
    Fallback,
    /// The fallback asset is not on disk; the body is empty
    FallbackMissing,
}

impl ArtworkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtworkSource::Cache => "cache",
            ArtworkSource::Remote { .. } => "remote",
            ArtworkSource::Fallback => "fallback",
            ArtworkSource::FallbackMissing => "fallback-missing",
        }
    }
}

#[derive(Debug)]
pub enum ArtworkBody {
    Bytes(Bytes),
    Stream(UpstreamStream),
    Empty,
}

/// Outcome of [`ArtworkFetcher::fetch`]. Always servable.
#[derive(Debug)]
pub struct Artwork {
    pub source: ArtworkSource,
    pub content_type: String,
    pub body: ArtworkBody,
    pub attempts: Vec<Attempt>,
}

enum Fetched {
    Buffered(Bytes),
    Streaming {
        content_type: String,
        stream: UpstreamStream,
    },
}

/// Fetches remote artwork with per-candidate timeouts, an optional permanent
/// on-disk cache, and a local fallback asset.
///
/// No lock guards the cache check-then-write: two concurrent first requests
/// may both fetch remotely and both write the cache file. The last writer
/// wins and the file is replaced atomically.
pub struct ArtworkFetcher {
    client: reqwest::Client,
    config: ArtworkConfig,
    open_streams: Arc<AtomicUsize>,
}

impl ArtworkFetcher {
    pub fn new(config: ArtworkConfig) -> Result<Self, reqwest::Error> {
        // read_timeout bounds each gap between chunks, so a stalled stream ends
        // without capping the length of a healthy transfer
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            open_streams: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of upstream responses currently being streamed to clients
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn cache_path(&self) -> Option<&Path> {
        self.config
            .cache_fetched_images
            .then_some(self.config.cache_file.as_path())
    }

    pub async fn fetch(&self) -> Artwork {
        if let Some(bytes) = self.read_cache().await {
            debug!("Serving artwork from cache");
            return Artwork {
                source: ArtworkSource::Cache,
                content_type: JPEG.to_string(),
                body: ArtworkBody::Bytes(bytes),
                attempts: Vec::new(),
            };
        }

        let mut attempts = Vec::with_capacity(self.config.candidates.len());

        for url in &self.config.candidates {
            match self.attempt(url).await {
                Ok(fetched) => {
                    info!("Fetched artwork from {}", url);
                    attempts.push(Attempt {
                        url: url.clone(),
                        result: Ok(()),
                    });

                    let (content_type, body) = match fetched {
                        Fetched::Buffered(bytes) => {
                            self.write_cache(&bytes).await;
                            (JPEG.to_string(), ArtworkBody::Bytes(bytes))
                        }
                        Fetched::Streaming {
                            content_type,
                            stream,
                        } => (content_type, ArtworkBody::Stream(stream)),
                    };

                    return Artwork {
                        source: ArtworkSource::Remote { url: url.clone() },
                        content_type,
                        body,
                        attempts,
                    };
                }
                Err(failure) => {
                    warn!("Artwork candidate {} failed: {}", url, failure);
                    attempts.push(Attempt {
                        url: url.clone(),
                        result: Err(failure),
                    });
                }
            }
        }

        self.fallback(attempts).await
    }

    async fn attempt(&self, url: &str) -> Result<Fetched, AttemptFailure> {
        let timeout = self.config.timeout;

        if self.cache_path().is_some() {
            // Buffered: the whole transfer has to finish within the timeout
            let bytes = tokio::time::timeout(timeout, async {
                let response = self.send(url).await?;
                Ok::<_, AttemptFailure>(response.bytes().await?)
            })
            .await
            .map_err(|_| AttemptFailure::Timeout)??;

            return Ok(Fetched::Buffered(bytes));
        }

        // Streaming: the timeout bounds the response headers, read_timeout each later chunk
        let response = tokio::time::timeout(timeout, self.send(url))
            .await
            .map_err(|_| AttemptFailure::Timeout)??;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(JPEG)
            .to_string();

        let lease = UpstreamLease::acquire(url, self.open_streams.clone());
        Ok(Fetched::Streaming {
            content_type,
            stream: UpstreamStream::new(response, lease),
        })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, AttemptFailure> {
        let response = self.client.get(url).send().await?;

        if response.status() != StatusCode::OK {
            return Err(AttemptFailure::Status(response.status().as_u16()));
        }

        Ok(response)
    }

    async fn read_cache(&self) -> Option<Bytes> {
        let path = self.cache_path()?;

        match tokio::fs::read(path).await {
            Ok(contents) => Some(Bytes::from(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read artwork cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist a fetched image. Failures are logged; the bytes are served anyway.
    async fn write_cache(&self, bytes: &Bytes) {
        let Some(path) = self.cache_path() else {
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("Failed to create cache dir {}: {}", parent.display(), e);
                return;
            }
        }

        // Written beside the target and renamed so readers never see a partial file
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let result = async {
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        match result {
            Ok(()) => info!("Cached artwork at {} ({} bytes)", path.display(), bytes.len()),
            Err(e) => {
                warn!("Failed to write artwork cache {}: {}", path.display(), e);
                let _ = tokio::fs::remove_file(&tmp).await;
            }
        }
    }

    async fn fallback(&self, attempts: Vec<Attempt>) -> Artwork {
        let path = &self.config.fallback_file;
        let content_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();

        match tokio::fs::read(path).await {
            Ok(contents) => {
                info!("Serving fallback artwork {}", path.display());
                Artwork {
                    source: ArtworkSource::Fallback,
                    content_type,
                    body: ArtworkBody::Bytes(Bytes::from(contents)),
                    attempts,
                }
            }
            Err(e) => {
                warn!("Fallback artwork {} unavailable: {}", path.display(), e);
                Artwork {
                    source: ArtworkSource::FallbackMissing,
                    content_type,
                    body: ArtworkBody::Empty,
                    attempts,
                }
            }
        }
    }
}
