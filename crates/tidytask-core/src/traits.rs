//! Core traits for tidytask abstractions.
//!
//! These traits define the seams between the enrichment pipeline and its
//! collaborators. Concrete implementations live in `tidytask-db` (Postgres),
//! `tidytask-inference` (completion backends), and `tidytask-enrich`
//! (Redis publisher).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EnrichmentPreferences, FeatureFlag, FeatureSet, Result, TaskFieldUpdates, TaskRecord,
    TaskUpdatedMessage, Tier,
};

// =============================================================================
// STORAGE
// =============================================================================

/// Loads and persists the enrichment-relevant fields of a task.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Load a task scoped to its owner. Returns `Error::TaskNotFound` when the
    /// task is gone or belongs to someone else.
    async fn load(&self, task_id: Uuid, owner_id: Uuid) -> Result<TaskRecord>;

    /// Write all given fields in one statement, bumping `version` and
    /// `updated_at`. Scoped to `(task_id, owner_id)`; returns `false` when no
    /// row matched (deleted or reassigned mid-flight).
    async fn apply_fields(
        &self,
        task_id: Uuid,
        owner_id: Uuid,
        updates: &TaskFieldUpdates,
    ) -> Result<bool>;
}

/// Per-owner enrichment preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Preferences for an owner; all-auto when nothing is stored.
    async fn preferences(&self, owner_id: Uuid) -> Result<EnrichmentPreferences>;
}

/// Per-owner subscription tier.
#[async_trait]
pub trait TierLookup: Send + Sync {
    /// Current tier; `Tier::Free` when the owner has no subscription.
    async fn tier(&self, owner_id: Uuid) -> Result<Tier>;
}

/// Daily per-feature usage metering.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Uses of `feature` by `owner_id` so far today (UTC).
    async fn count_today(&self, owner_id: Uuid, feature: FeatureFlag) -> Result<i64>;

    /// Record one use of each feature.
    async fn record(&self, owner_id: Uuid, features: &FeatureSet) -> Result<()>;
}

// =============================================================================
// COMPLETION
// =============================================================================

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Completion output.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

/// Stateless, provider-agnostic text completion.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one completion. Transport/HTTP failures surface as
    /// `Error::ExternalService` or, when worth retrying, `Error::Unavailable`.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Get the model name.
    fn model_name(&self) -> &str;
}

// =============================================================================
// REALTIME
// =============================================================================

/// Publish/subscribe transport for task change notifications.
#[async_trait]
pub trait ChangePublisher: Send + Sync {
    async fn publish(&self, channel: &str, message: &TaskUpdatedMessage) -> Result<()>;
}
