// src/fetch.rs
use std::future::Future;
use std::time::Duration;
use log::{debug, warn};
use rand::Rng;
use thiserror::Error;
use crate::config::{Config, USER_AGENT};
use crate::models::server::ServerInfo;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid server list: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Somewhere a full server list can be fetched from.
pub trait ServerSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Vec<ServerInfo>, FetchError>> + Send;
}

/// Client for the matchmaking API's `/get-games` endpoint.
pub struct UpstreamClient {
    client: reqwest::Client,
    url: String,
    username: String,
    token: String,
    max_attempts: u32,
    backoff: Duration,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/get-games", config.upstream_url.trim_end_matches('/')),
            username: config.username.clone(),
            token: config.token.clone(),
            max_attempts: config.fetch_max_attempts.max(1),
            backoff: config.fetch_backoff(),
        })
    }

    async fn fetch_once(&self) -> Result<Vec<ServerInfo>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("username", &self.username), ("token", &self.token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await?;
        let servers: Vec<ServerInfo> = serde_json::from_slice(&body)?;
        debug!("Upstream returned {} servers ({} bytes)", servers.len(), body.len());
        Ok(servers)
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(1u32 << attempt.min(6));
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis().min(1000) as u64 / 2);
        base + Duration::from_millis(jitter_ms)
    }
}

impl ServerSource for UpstreamClient {
    async fn fetch(&self) -> Result<Vec<ServerInfo>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once().await {
                Ok(servers) => return Ok(servers),
                Err(e) if attempt + 1 < self.max_attempts => {
                    let delay = self.retry_delay(attempt);
                    warn!(
                        "Fetch attempt {} of {} failed: {}, retrying in {:?}",
                        attempt + 1,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
