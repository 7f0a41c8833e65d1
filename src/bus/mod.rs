//! Status notification bus.
//!
//! # Data Flow
//! ```text
//! StatusMonitor (changed status)
//!     → StatusBus (local broadcast: UI, admin SSE, tests)
//!     → RemoteChannel (best-effort broadcast to other processes)
//!
//! RemoteChannel inbound frame
//!     → StatusMonitor::apply_remote (local notify, never re-broadcast)
//! ```
//!
//! # Design Decisions
//! - Local delivery never blocks the publisher; slow subscribers lag and skip
//! - Remote failures are reported to the caller as values and only logged

pub mod websocket;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::health::ServiceStatus;

pub use websocket::WebSocketChannel;

/// Errors from the remote broadcast channel.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("remote channel is not connected")]
    Disconnected,

    #[error("remote channel outbound queue is full")]
    QueueFull,

    #[error("remote channel is closed")]
    Closed,

    #[error("failed to encode status: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Frame exchanged on the remote pub/sub channel, keyed by service name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStatusEvent {
    /// Logical channel; frames for other channels are ignored.
    pub channel: String,
    /// Instance that produced the frame.
    pub source: String,
    /// Service the status belongs to.
    pub service: String,
    pub status: ServiceStatus,
}

/// Outbound half of the remote status channel.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Broadcast `status` to remote subscribers.
    async fn publish(&self, status: &ServiceStatus) -> Result<(), BroadcastError>;
}

/// Local publish/subscribe channel of status changes.
#[derive(Debug, Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<ServiceStatus>,
}

impl StatusBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, status: ServiceStatus) -> usize {
        self.tx.send(status).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceStatus> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ServiceState;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = StatusBus::new(8);
        assert_eq!(bus.publish(ServiceStatus::new("llm-engine", ServiceState::Online)), 0);
    }

    #[tokio::test]
    async fn test_fan_out() {
        let bus = StatusBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(ServiceStatus::new("speech", ServiceState::Degraded)), 2);
        assert_eq!(a.recv().await.unwrap().state, ServiceState::Degraded);
        assert_eq!(b.recv().await.unwrap().name, "speech");
    }
}
