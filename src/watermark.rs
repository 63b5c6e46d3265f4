//! Per-repository fetch watermarks in Consul's KV store
//!
//! A watermark is the timestamp of the last successfully completed poll
//! cycle for one repository; its absence means the repository has never
//! been fetched. The store owns the value: it is read at cycle start and
//! written only after a successful fetch+append, so a crashed cycle
//! re-fetches the same window instead of losing commits.

use crate::error::WatermarkError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Fixed key prefix namespacing githarvest entries in a shared Consul agent
const KEY_PREFIX: &str = "githarvest/repo";

/// Bounded retry policy for transient faults on watermark reads
const GET_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Trait for the per-repository watermark store
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Last committed watermark for `repo`, or `None` if never fetched
    async fn get(&self, repo: &str) -> Result<Option<DateTime<Utc>>, WatermarkError>;

    /// Durable single-key upsert. Not transactional with the log append;
    /// callers must only invoke this after a fully successful append.
    async fn set(&self, repo: &str, at: DateTime<Utc>) -> Result<(), WatermarkError>;
}

/// Watermark store backed by Consul's HTTP KV API
pub struct ConsulKv {
    http: Client,
    base_url: String,
}

/// Outcome of one read attempt against the KV endpoint
enum GetAttempt {
    /// Key exists; raw value bytes as text
    Found(String),
    /// Key has never been written
    Missing,
    /// Connectivity fault worth retrying
    Transient(String),
}

impl ConsulKv {
    /// Create a store against a Consul agent at `addr` (`host:port`)
    pub fn new(addr: &str) -> Result<Self, WatermarkError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WatermarkError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: format!("http://{}/v1/kv", addr.trim_end_matches('/')),
        })
    }

    /// KV URL for one repository's watermark key
    fn key_url(&self, repo: &str) -> String {
        format!("{}/{}/{}", self.base_url, KEY_PREFIX, repo)
    }

    async fn get_once(&self, url: &str) -> Result<GetAttempt, WatermarkError> {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Ok(GetAttempt::Transient(e.to_string())),
        };

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(GetAttempt::Missing);
        }

        if !response.status().is_success() {
            return Err(WatermarkError::UnexpectedStatus(
                response.status().as_u16(),
            ));
        }

        match response.text().await {
            Ok(body) => Ok(GetAttempt::Found(body)),
            Err(e) => Ok(GetAttempt::Transient(e.to_string())),
        }
    }
}

#[async_trait]
impl WatermarkStore for ConsulKv {
    async fn get(&self, repo: &str) -> Result<Option<DateTime<Utc>>, WatermarkError> {
        // ?raw returns the bare value bytes instead of the JSON envelope
        let url = format!("{}?raw", self.key_url(repo));
        let mut last_error = String::new();

        for attempt in 1..=GET_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(RETRY_BACKOFF * (attempt - 1)).await;
            }

            match self.get_once(&url).await? {
                GetAttempt::Found(body) => return parse_watermark(&body).map(Some),
                GetAttempt::Missing => return Ok(None),
                GetAttempt::Transient(reason) => {
                    tracing::debug!(
                        "Watermark read for '{}' failed (attempt {}/{}): {}",
                        repo,
                        attempt,
                        GET_ATTEMPTS,
                        reason
                    );
                    last_error = reason;
                }
            }
        }

        Err(WatermarkError::Unavailable {
            attempts: GET_ATTEMPTS,
            reason: last_error,
        })
    }

    async fn set(&self, repo: &str, at: DateTime<Utc>) -> Result<(), WatermarkError> {
        let url = self.key_url(repo);

        let response = self
            .http
            .put(&url)
            .body(format_watermark(at))
            .send()
            .await
            .map_err(|e| WatermarkError::WriteFailed {
                repo: repo.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(WatermarkError::WriteFailed {
                repo: repo.to_string(),
                reason: format!("status {}", response.status().as_u16()),
            });
        }

        tracing::debug!("Committed watermark {} for '{}'", format_watermark(at), repo);
        Ok(())
    }
}

/// Encode a watermark the way it is stored: RFC 3339, UTC, `Z` suffix
fn format_watermark(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Decode stored value bytes back into a watermark
fn parse_watermark(raw: &str) -> Result<DateTime<Utc>, WatermarkError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| WatermarkError::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_key_url_is_namespaced() {
        let store = ConsulKv::new("localhost:8500").unwrap();
        assert_eq!(
            store.key_url("demo"),
            "http://localhost:8500/v1/kv/githarvest/repo/demo"
        );
    }

    #[test]
    fn test_format_watermark() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(format_watermark(at), "2024-03-01T12:30:05Z");
    }

    #[test]
    fn test_watermark_round_trip() {
        let at = Utc.with_ymd_and_hms(2023, 11, 20, 8, 15, 42).unwrap();
        let parsed = parse_watermark(&format_watermark(at)).unwrap();
        assert_eq!(parsed, at);
    }

    #[test]
    fn test_parse_watermark_accepts_offsets() {
        let parsed = parse_watermark("2024-03-01T14:30:05+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap());
    }

    #[test]
    fn test_parse_watermark_trims_whitespace() {
        let parsed = parse_watermark("2024-03-01T12:30:05Z\n").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap());
    }

    #[test]
    fn test_parse_watermark_rejects_garbage() {
        let err = parse_watermark("not a timestamp").unwrap_err();
        assert!(matches!(err, WatermarkError::InvalidTimestamp(_)));
    }
}
