//! Reachability probe run right before each download.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

/// Answers "is this URL worth handing to the downloader?".
#[async_trait]
pub trait LinkChecker: Send + Sync {
    /// Never fails: every error is just `false`.
    async fn is_reachable(&self, url: &str) -> bool;
}

/// One GET per call, no retries, bounded by a fixed timeout.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkChecker for HttpProbe {
    async fn is_reachable(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status != StatusCode::OK {
                    debug!(url, %status, "probe got non-200 status");
                }
                status == StatusCode::OK
            }
            Err(err) => {
                debug!(url, error = %err, "probe failed");
                false
            }
        }
    }
}
