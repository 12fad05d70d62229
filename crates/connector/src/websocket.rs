//! Binance combined-stream WebSocket client
//!
//! One connection carries the `<symbol>@ticker` streams of a whole batch.
//! The client sends a WS ping every heartbeat interval and gives up on the
//! connection when no data frame arrives within the idle timeout.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::ConnectorError;
use crate::messages::{decode_tick, Tick};
use crate::traits::{TickSource, TickStream};

/// Binance spot public stream endpoint
pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443";

pub const DEFAULT_HEARTBEAT_SECS: u64 = 15;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 45;

/// Combined ticker stream client for Binance
#[derive(Debug, Clone)]
pub struct BinanceStream {
    base_url: String,
    heartbeat: Duration,
    idle_timeout: Duration,
}

impl Default for BinanceStream {
    fn default() -> Self {
        Self::new(BINANCE_WS_URL)
    }
}

impl BinanceStream {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Build `<base>/stream?streams=a@ticker/b@ticker/...`
    pub fn stream_url(&self, symbols: &[String]) -> Result<Url, ConnectorError> {
        if symbols.is_empty() {
            return Err(ConnectorError::InvalidUrl("no symbols to subscribe".into()));
        }
        let streams = symbols
            .iter()
            .map(|s| format!("{}@ticker", s.to_ascii_lowercase()))
            .collect::<Vec<_>>()
            .join("/");
        let raw = format!("{}/stream?streams={}", self.base_url.trim_end_matches('/'), streams);
        Url::parse(&raw).map_err(|e| ConnectorError::InvalidUrl(format!("{}: {}", raw, e)))
    }
}

#[async_trait]
impl TickSource for BinanceStream {
    async fn subscribe(&self, symbols: &[String]) -> Result<TickStream, ConnectorError> {
        let url = self.stream_url(symbols)?;
        debug!(host = ?url.host_str(), streams = symbols.len(), "Connecting to Binance combined stream");

        let (ws, response) = connect_async(url.as_str())
            .await
            .map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;

        info!(status = ?response.status(), streams = symbols.len(), "Binance WebSocket connected");

        let connection = Connection::new(ws, self.heartbeat, self.idle_timeout);
        let ticks = futures_util::stream::unfold(connection, |mut conn| async move {
            conn.next_tick().await.map(|tick| (tick, conn))
        });
        Ok(ticks.boxed())
    }
}

/// Live connection state driven by the tick stream
struct Connection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ping: Interval,
    idle_timeout: Duration,
    deadline: Instant,
}

impl Connection {
    fn new(
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        heartbeat: Duration,
        idle_timeout: Duration,
    ) -> Self {
        let now = Instant::now();
        let mut ping = interval_at(now + heartbeat, heartbeat);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ws,
            ping,
            idle_timeout,
            deadline: now + idle_timeout,
        }
    }

    /// Next decoded tick, or `None` once the connection is unusable
    async fn next_tick(&mut self) -> Option<Tick> {
        loop {
            tokio::select! {
                _ = self.ping.tick() => {
                    trace!("Sending WS ping");
                    if let Err(e) = self.ws.send(Message::Ping(Vec::new())).await {
                        warn!(error = %e, "Failed to send WS ping, connection may be dead");
                        return None;
                    }
                }

                _ = sleep_until(self.deadline) => {
                    warn!(
                        timeout_secs = self.idle_timeout.as_secs_f64(),
                        "No data frame within idle timeout"
                    );
                    return None;
                }

                msg = self.ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.deadline = Instant::now() + self.idle_timeout;
                            if let Some(tick) = decode_tick(&text) {
                                return Some(tick);
                            }
                            trace!(raw = %text, "Skipping non-ticker frame");
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.deadline = Instant::now() + self.idle_timeout;
                            if let Some(tick) = std::str::from_utf8(&data).ok().and_then(decode_tick) {
                                return Some(tick);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            trace!("Received WS ping, sending pong");
                            if let Err(e) = self.ws.send(Message::Pong(data)).await {
                                warn!(error = %e, "Failed to answer WS ping");
                                return None;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(frame = ?frame, "Binance WebSocket closed");
                            return None;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!(error = %e, "Binance WebSocket error");
                            return None;
                        }
                        None => return None,
                    }
                }
            }
        }
    }
}
