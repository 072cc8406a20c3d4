use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use tracing::warn;

/// Snapshot published to the home manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DoorbellStatus {
    #[serde(rename = "Idle")]
    pub idle: bool,

    #[serde(rename = "Automatic")]
    pub automatic: bool,

    #[serde(rename = "AutoPossible")]
    pub auto_possible: bool,

    #[serde(rename = "Manual")]
    pub manual: bool,

    #[serde(rename = "Triggered")]
    pub triggered: bool,

    #[serde(rename = "Terminated")]
    pub terminated: bool,

    #[serde(rename = "Ringing")]
    pub ringing: bool,
}

/// Messages on the outbound status topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "service")]
pub enum OutboundMessage {
    #[serde(rename = "Status Update")]
    Status(DoorbellStatus),
    Heartbeat,
    Restart,
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<Vec<u8>, PublishError> {
        serde_json::to_vec(self).map_err(PublishError::Encode)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to publish outbound message: {0}")]
    Transport(String),
}

/// Outbound channel to the supervisor
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError>;
}

/// Publishes status snapshots and control messages, swallowing transport failures.
///
/// The last published status is also kept on a watch channel for local readers such as the
/// HTTP status API.
pub struct StatusPublisher {
    sink: Arc<dyn StatusSink>,
    last: watch::Sender<Option<DoorbellStatus>>,
}

impl StatusPublisher {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        let (last, _) = watch::channel(None);
        Self { sink, last }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DoorbellStatus>> {
        self.last.subscribe()
    }

    pub fn last(&self) -> Option<DoorbellStatus> {
        *self.last.borrow()
    }

    /// Publish unconditionally.
    pub async fn publish(&self, status: DoorbellStatus) {
        debug!("Publishing status: {:?}", status);
        self.last.send_replace(Some(status));
        self.send(OutboundMessage::Status(status)).await;
    }

    /// Publish only if `status` differs from the last published snapshot.
    pub async fn publish_if_changed(&self, status: DoorbellStatus) {
        if self.last() != Some(status) {
            self.publish(status).await;
        }
    }

    pub async fn send(&self, message: OutboundMessage) {
        if let Err(e) = self.sink.publish(&message).await {
            warn!("{}", e);
        }
    }
}
