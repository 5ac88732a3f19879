//! Realtime task change messages and the in-process change bus.
//!
//! Enrichment announces which fields landed on a per-owner channel so
//! realtime clients can refresh without polling. The same message goes to
//! Redis pub/sub (see `tidytask-enrich`) and/or to [`LocalChangeBus`] for
//! in-process subscribers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{ChangePublisher, EnrichmentResult, FeatureSet, Result};

/// Payload published after a successful enrichment write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdatedMessage {
    /// Always `"task_updated"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub record_id: Uuid,
    pub owner_id: Uuid,
    /// Flags whose values were actually written.
    pub features: FeatureSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned_description: Option<String>,
    pub entity_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_due_time: Option<bool>,
}

impl TaskUpdatedMessage {
    pub const KIND: &'static str = "task_updated";

    /// Build from the result that was just persisted.
    pub fn from_result(owner_id: Uuid, record_id: Uuid, applied: &EnrichmentResult) -> Self {
        let updates = applied.to_updates();
        Self {
            kind: Self::KIND.to_string(),
            record_id,
            owner_id,
            features: applied.landed_features(),
            cleaned_title: updates.ai_cleaned_title,
            cleaned_description: updates.ai_cleaned_description,
            entity_count: updates.entities.as_ref().map_or(0, Vec::len),
            complexity: updates.complexity,
            due_at: updates.due.map(|d| d.at),
            has_due_time: updates.due.map(|d| d.has_time),
        }
    }
}

/// A message together with the channel it was published on.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub channel: String,
    pub message: TaskUpdatedMessage,
}

/// In-process broadcast bus for task change messages.
///
/// Slow receivers that fall behind get a `Lagged` error and miss messages;
/// freshness matters more than completeness for realtime refresh.
#[derive(Clone)]
pub struct LocalChangeBus {
    tx: broadcast::Sender<ChannelMessage>,
}

impl LocalChangeBus {
    /// Create a new bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all channels.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalChangeBus {
    fn default() -> Self {
        Self::new(crate::defaults::CHANGE_BUS_CAPACITY)
    }
}

#[async_trait]
impl ChangePublisher for LocalChangeBus {
    async fn publish(&self, channel: &str, message: &TaskUpdatedMessage) -> Result<()> {
        tracing::debug!(
            channel,
            record_id = %message.record_id,
            subscriber_count = self.tx.receiver_count(),
            "LocalChangeBus publish"
        );
        // No subscribers is not an error.
        let _ = self.tx.send(ChannelMessage {
            channel: channel.to_string(),
            message: message.clone(),
        });
        Ok(())
    }
}
