// src/repository/client.rs

//! HTTP client for package downloads
//!
//! Thin wrapper around blocking reqwest with a request timeout and a small
//! retry loop. Responses are streamed to disk, never buffered whole.

use crate::error::{Error, Result};
use indicatif::ProgressBar;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for HTTP requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum attempts for a failed request
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// HTTP client with retry support
pub struct HttpClient {
    client: Client,
    max_retries: u32,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Download(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    // Non-success statuses are not transient enough to retry
                    return Err(Error::Download(format!(
                        "HTTP {} from {}",
                        response.status(),
                        url
                    )));
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Download(format!(
                            "Failed to fetch {url} after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Fetch attempt {} of {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Download `url` into `dest`, streaming
    pub fn download_file(&self, url: &str, dest: &Path, progress: Option<&ProgressBar>) -> Result<u64> {
        debug!("Downloading {} to {}", url, dest.display());
        let mut response = self.get(url)?;
        let mut file = File::create(dest)?;

        let mut downloaded: u64 = 0;
        let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|e| Error::Download(format!("Failed to read response from {url}: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
            downloaded += n as u64;
            if let Some(pb) = progress {
                pb.set_position(downloaded);
            }
        }
        file.sync_all()?;

        Ok(downloaded)
    }

    /// Fetch and decode a JSON document
    pub fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("Fetching JSON from {}", url);
        self.get(url)?
            .json()
            .map_err(|e| Error::Download(format!("Failed to parse JSON from {url}: {e}")))
    }
}
