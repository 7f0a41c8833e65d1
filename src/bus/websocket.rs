//! WebSocket implementation of the remote status channel.
//!
//! # Responsibilities
//! - Keep one connection to the pub/sub relay, reconnecting with backoff
//! - Queue outbound statuses without blocking the monitor
//! - Decode inbound frames and hand them to the composition root
//!
//! # Design Decisions
//! - Publishing while disconnected fails fast instead of buffering stale state
//! - Frames from this instance (same `source`) are dropped on receipt

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::{BroadcastError, RemoteChannel, RemoteStatusEvent};
use crate::config::BroadcastConfig;
use crate::health::ServiceStatus;
use crate::resilience::backoff::calculate_backoff;

const RECONNECT_BASE_MS: u64 = 500;
const RECONNECT_MAX_MS: u64 = 30_000;

/// Remote status channel over a WebSocket relay.
#[derive(Debug, Clone)]
pub struct WebSocketChannel {
    channel: String,
    source: String,
    outbound: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
}

impl WebSocketChannel {
    /// Spawn the connection task.
    ///
    /// Returns the publishing handle, the receiver of inbound remote statuses
    /// and the task handle. The task exits when `shutdown` is cancelled.
    pub fn spawn(
        config: &BroadcastConfig,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Receiver<ServiceStatus>, JoinHandle<()>) {
        let capacity = config.queue_capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let connected = Arc::new(AtomicBool::new(false));
        let source = Uuid::new_v4().to_string();

        let connection = Connection {
            url: config.url.clone(),
            channel: config.channel.clone(),
            source: source.clone(),
            connected: connected.clone(),
            inbound: inbound_tx,
        };
        let handle = tokio::spawn(connection.run(outbound_rx, shutdown));

        let channel = Self {
            channel: config.channel.clone(),
            source,
            outbound: outbound_tx,
            connected,
        };
        (channel, inbound_rx, handle)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Identifier stamped on frames sent by this instance.
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[async_trait]
impl RemoteChannel for WebSocketChannel {
    async fn publish(&self, status: &ServiceStatus) -> Result<(), BroadcastError> {
        if !self.is_connected() {
            return Err(BroadcastError::Disconnected);
        }

        let event = RemoteStatusEvent {
            channel: self.channel.clone(),
            source: self.source.clone(),
            service: status.name.clone(),
            status: status.clone(),
        };
        let frame = serde_json::to_string(&event)?;

        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BroadcastError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BroadcastError::Closed,
        })
    }
}

struct Connection {
    url: String,
    channel: String,
    source: String,
    connected: Arc<AtomicBool>,
    inbound: mpsc::Sender<ServiceStatus>,
}

impl Connection {
    async fn run(self, mut outbound: mpsc::Receiver<String>, shutdown: CancellationToken) {
        let mut attempt: u32 = 0;

        loop {
            let connected = tokio::select! {
                _ = shutdown.cancelled() => break,
                res = connect_async(self.url.as_str()) => res,
            };

            match connected {
                Ok((stream, _)) => {
                    attempt = 0;
                    self.connected.store(true, Ordering::Relaxed);
                    tracing::info!(url = %self.url, channel = %self.channel, "Remote status channel connected");

                    let (mut sink, mut source) = stream.split();
                    let keep_running = loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                let _ = sink.close().await;
                                break false;
                            }
                            frame = outbound.recv() => match frame {
                                Some(text) => {
                                    if let Err(e) = sink.send(Message::text(text)).await {
                                        tracing::warn!(error = %e, "Remote status send failed");
                                        break true;
                                    }
                                }
                                None => {
                                    let _ = sink.close().await;
                                    break false;
                                }
                            },
                            incoming = source.next() => match incoming {
                                Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()).await,
                                Some(Ok(Message::Close(_))) | None => {
                                    tracing::info!(url = %self.url, "Remote status channel closed by peer");
                                    break true;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    tracing::warn!(error = %e, "Remote status channel read error");
                                    break true;
                                }
                            },
                        }
                    };

                    self.connected.store(false, Ordering::Relaxed);
                    if !keep_running {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, attempt = attempt, error = %e, "Remote status channel connect failed");
                }
            }

            attempt = attempt.saturating_add(1);
            let delay: Duration = calculate_backoff(attempt, RECONNECT_BASE_MS, RECONNECT_MAX_MS);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.connected.store(false, Ordering::Relaxed);
        tracing::info!(url = %self.url, "Remote status channel stopped");
    }

    async fn handle_frame(&self, text: &str) {
        let event: RemoteStatusEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed remote status frame");
                return;
            }
        };

        if event.channel != self.channel || event.source == self.source {
            return;
        }
        if event.service != event.status.name {
            tracing::debug!(service = %event.service, status_name = %event.status.name, "Ignoring remote frame with mismatched key");
            return;
        }

        if self.inbound.send(event.status).await.is_err() {
            tracing::debug!("Remote status receiver dropped");
        }
    }
}
