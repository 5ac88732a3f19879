//! Change publishing.
//!
//! [`RedisPublisher`] sends change messages over Redis pub/sub, and
//! [`FanoutPublisher`] sends them to several transports at once.
//! [`ChangeNotifier`] is what the pipeline calls: it picks the per-owner
//! channel and swallows failures, since realtime refresh is best effort.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tidytask_core::{ChangePublisher, EnrichmentResult, Error, Result, TaskUpdatedMessage};

/// Redis pub/sub publisher.
#[derive(Clone)]
pub struct RedisPublisher {
    connection: ConnectionManager,
}

impl RedisPublisher {
    /// Connect to `redis_url`. The connection manager reconnects on its own
    /// after the initial connection succeeds.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("Invalid Redis URL: {}", e)))?;
        let connection = ConnectionManager::new(client).await?;
        info!(
            subsystem = "enrich",
            component = "publisher",
            url = %redis_url.replace(|c: char| c.is_ascii_alphanumeric(), "*"),
            "Redis change publisher connected"
        );
        Ok(Self { connection })
    }

    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl ChangePublisher for RedisPublisher {
    async fn publish(&self, channel: &str, message: &TaskUpdatedMessage) -> Result<()> {
        let payload = serde_json::to_string(message)
            .map_err(|e| Error::Publish(format!("Failed to serialize message: {}", e)))?;
        let mut conn = self.connection.clone();
        let receivers: i64 = conn.publish(channel, payload).await?;
        debug!(channel, receivers, record_id = %message.record_id, "Redis PUBLISH");
        Ok(())
    }
}

/// Publishes to every inner publisher. All are attempted; the first error is
/// returned.
#[derive(Clone, Default)]
pub struct FanoutPublisher {
    publishers: Vec<Arc<dyn ChangePublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, publisher: Arc<dyn ChangePublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

#[async_trait]
impl ChangePublisher for FanoutPublisher {
    async fn publish(&self, channel: &str, message: &TaskUpdatedMessage) -> Result<()> {
        let results = join_all(self.publishers.iter().map(|p| p.publish(channel, message))).await;
        results.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }
}

/// Announces applied enrichment on `<prefix><owner_id>`.
#[derive(Clone)]
pub struct ChangeNotifier {
    publisher: Arc<dyn ChangePublisher>,
    channel_prefix: String,
}

impl ChangeNotifier {
    pub fn new(publisher: Arc<dyn ChangePublisher>, channel_prefix: impl Into<String>) -> Self {
        Self {
            publisher,
            channel_prefix: channel_prefix.into(),
        }
    }

    /// Channel name for an owner.
    pub fn channel_for(&self, owner_id: Uuid) -> String {
        format!("{}{}", self.channel_prefix, owner_id)
    }

    /// Publish what landed. Failures are logged and dropped; returns whether
    /// the publish succeeded.
    pub async fn notify(&self, owner_id: Uuid, record_id: Uuid, applied: &EnrichmentResult) -> bool {
        let message = TaskUpdatedMessage::from_result(owner_id, record_id, applied);
        let channel = self.channel_for(owner_id);
        match self.publisher.publish(&channel, &message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    subsystem = "enrich",
                    component = "publisher",
                    %channel,
                    task_id = %record_id,
                    error = %e,
                    "Change publish failed"
                );
                false
            }
        }
    }
}
