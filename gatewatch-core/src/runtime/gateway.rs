//! Websocket client for the agent gateway
//!
//! Streams every JSON text message into the ingest channel. A dropped
//! connection clears the timeline and reconnects with exponential backoff.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::IngestEvent;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Double the delay, capped at `max`.
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Why a connection ended.
enum SessionEnd {
    /// Socket closed or errored; reconnect
    Dropped,
    /// Ingest channel closed; stop for good
    Shutdown,
}

pub struct GatewayClient {
    ws_url: String,
    reconnect_max: Duration,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ws_url: config.ws_url.clone(),
            reconnect_max: config.reconnect_max(),
        })
    }

    /// Connect, stream, reconnect. Returns once the ingest channel closes.
    pub async fn run(self, events: mpsc::Sender<IngestEvent>) -> Result<()> {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match self.stream_once(&events).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Dropped) => {
                    backoff = INITIAL_BACKOFF;
                    if events.send(IngestEvent::Disconnected).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.ws_url, error = %e, "Gateway connection failed");
                }
            }

            if events.is_closed() {
                return Ok(());
            }
            tracing::info!(delay_ms = backoff.as_millis() as u64, "Reconnecting to gateway");
            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff, self.reconnect_max);
        }
    }

    async fn stream_once(&self, events: &mpsc::Sender<IngestEvent>) -> Result<SessionEnd> {
        let (mut ws, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| Error::Transport(format!("connect to {} failed: {}", self.ws_url, e)))?;
        tracing::info!(url = %self.ws_url, "Connected to gateway");

        let mut frames = 0u64;
        while let Some(message) = ws.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Gateway closed the connection");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Gateway socket error");
                    break;
                }
            };

            let frame: serde_json::Value = match serde_json::from_str(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping non-JSON message");
                    continue;
                }
            };

            frames += 1;
            if events.send(IngestEvent::Frame(frame)).await.is_err() {
                let _ = ws.close(None).await;
                return Ok(SessionEnd::Shutdown);
            }
        }

        tracing::info!(frames, "Gateway stream ended");
        Ok(SessionEnd::Dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let max = Duration::from_secs(30);
        let mut delay = INITIAL_BACKOFF;
        let mut seen = Vec::new();
        for _ in 0..7 {
            delay = next_backoff(delay, max);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        let config = GatewayConfig {
            ws_url: String::new(),
            ..Default::default()
        };
        assert!(GatewayClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_run_stops_when_ingest_closed() {
        // Nothing listens on port 9; the connect fails and the closed channel ends the loop.
        let config = GatewayConfig {
            ws_url: "ws://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = GatewayClient::new(&config).unwrap();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        client.run(tx).await.unwrap();
    }
}
