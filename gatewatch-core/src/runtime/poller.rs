//! Periodic session snapshot poll
//!
//! Fetches the gateway's session listing over HTTP and hands it to the ingest
//! actor, which upserts every entry. Failures are logged and retried on the
//! next tick.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::IngestEvent;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};

/// One entry of the session listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub key: String,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    key: String,
    #[serde(default, alias = "updatedAt")]
    last_activity_at: Option<RawTimestamp>,
}

/// Epoch milliseconds or RFC 3339.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

impl RawTimestamp {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Millis(ms) => DateTime::<Utc>::from_timestamp_millis(*ms),
            RawTimestamp::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotBody {
    List(Vec<serde_json::Value>),
    Wrapped { sessions: Vec<serde_json::Value> },
}

/// Parse a session listing body: a bare array or `{"sessions": [...]}`.
///
/// Entries without a usable key are skipped.
pub fn parse_snapshot_body(body: &str) -> Result<Vec<SessionSnapshot>> {
    let entries = match serde_json::from_str::<SnapshotBody>(body)? {
        SnapshotBody::List(entries) | SnapshotBody::Wrapped { sessions: entries } => entries,
    };

    let total = entries.len();
    let snapshots: Vec<SessionSnapshot> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawSnapshot>(entry).ok())
        .filter(|raw| !raw.key.is_empty())
        .map(|raw| SessionSnapshot {
            last_activity_at: raw.last_activity_at.as_ref().and_then(RawTimestamp::to_datetime),
            key: raw.key,
        })
        .collect();

    if snapshots.len() < total {
        tracing::debug!(
            skipped = total - snapshots.len(),
            "Skipped malformed session listing entries"
        );
    }
    Ok(snapshots)
}

pub struct SessionPoller {
    http_client: reqwest::Client,
    url: String,
    interval: Duration,
}

impl SessionPoller {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: config.sessions_url(),
            interval: config.poll_interval(),
        })
    }

    /// Fetch the current session listing once.
    pub async fn fetch(&self) -> Result<Vec<SessionSnapshot>> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Poll(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Poll(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Poll(format!("API error ({}): {}", status, body)));
        }

        parse_snapshot_body(&body)
    }

    /// Poll on a fixed interval until the ingest channel closes.
    pub async fn run(self, events: mpsc::Sender<IngestEvent>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.fetch().await {
                Ok(snapshots) => {
                    tracing::debug!(url = %self.url, count = snapshots.len(), "Polled sessions");
                    if events.send(IngestEvent::Snapshot(snapshots)).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "Session poll failed");
                    if events.is_closed() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
