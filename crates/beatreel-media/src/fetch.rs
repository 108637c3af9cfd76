//! Audio acquisition over HTTP.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Audio fetch settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Whole-transfer deadline
    pub timeout: Duration,
    /// Refuse sources larger than this
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_bytes: 200 * 1024 * 1024,
        }
    }
}

impl FetchConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: std::env::var("AUDIO_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_bytes: std::env::var("AUDIO_MAX_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_bytes),
        }
    }
}

/// Streams a remote audio file to local storage.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Write the body at `url` to `dest`, returning the number of bytes
    /// written. On failure `dest` does not exist.
    async fn fetch(&self, url: &Url, dest: &Path) -> MediaResult<u64>;
}

/// [`AudioSource`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAudioFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpAudioFetcher {
    pub fn new(config: FetchConfig) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MediaError::Client(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    async fn stream_to_file(&self, url: &Url, dest: &Path) -> MediaResult<u64> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MediaError::download_failed(url.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(url.as_str(), format!("HTTP {}", status)));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(MediaError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                });
            }
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MediaError::download_failed(url.as_str(), e.to_string()))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(MediaError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl AudioSource for HttpAudioFetcher {
    async fn fetch(&self, url: &Url, dest: &Path) -> MediaResult<u64> {
        let started = Instant::now();
        debug!(url = %url, dest = %dest.display(), "Fetching audio");

        match self.stream_to_file(url, dest).await {
            Ok(bytes) => {
                info!(
                    url = %url,
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Audio fetched"
                );
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(e)
            }
        }
    }
}
