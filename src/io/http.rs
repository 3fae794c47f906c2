use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;

use super::ChunkSource;
use anyhow::{Result, bail};

/// Streamed HTTP download
///
/// Issues a single GET and hands out the body as it arrives. No Range
/// support is needed: the archive is decoded front to back.
pub struct HttpSource {
    response: Response,
    content_length: Option<u64>,
    transferred_bytes: u64,
}

impl HttpSource {
    /// Start the download
    ///
    /// Connection failures and timeouts before the response headers arrive are
    /// retried with a growing delay. Failures mid-body end the stream.
    pub async fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Self::with_client(&client, url, 10).await
    }

    pub async fn with_client(client: &Client, url: &str, max_retry: u32) -> Result<Self> {
        let mut retry_count = 0;

        let response = loop {
            match client.get(url).send().await {
                Ok(resp) => break resp,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= max_retry {
                        bail!("Max retries exceeded");
                    }
                    tracing::warn!(
                        "Connection error, retry {}/{}: {}",
                        retry_count,
                        max_retry,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if !response.status().is_success() {
            bail!("HTTP request failed with status: {}", response.status());
        }

        Ok(Self {
            content_length: response.content_length(),
            response,
            transferred_bytes: 0,
        })
    }

    /// Size announced by the server, if any
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }
}

#[async_trait]
impl ChunkSource for HttpSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match self.response.chunk().await? {
            Some(bytes) => {
                self.transferred_bytes += bytes.len() as u64;
                Ok(Some(bytes.to_vec()))
            }
            None => Ok(None),
        }
    }
}
