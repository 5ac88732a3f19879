//! Centralized default constants for tidytask.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// ENRICHMENT WORKER POOL
// =============================================================================

/// Number of enrichment runs allowed in flight per process.
pub const ENRICH_WORKERS: usize = 4;

/// Capacity of the in-process trigger queue. Triggers beyond this are dropped.
pub const ENRICH_QUEUE_CAPACITY: usize = 256;

/// Outer timeout for one enrichment run (load, model call, write, publish).
pub const ENRICH_RUN_TIMEOUT_SECS: u64 = 75;

/// Maximum restart depth after content-changed conflicts.
pub const ENRICH_MAX_RESTART_DEPTH: u32 = 3;

/// Capacity of the pipeline event broadcast channel.
pub const PIPELINE_EVENT_CAPACITY: usize = 256;

// =============================================================================
// DATABASE
// =============================================================================

/// Pool ceiling. Each in-flight run holds at most one connection at a time,
/// plus the notification listener.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Seconds to wait for a free connection.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds before an idle connection is closed.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// COMPLETION
// =============================================================================

/// Default generation model.
pub const GEN_MODEL: &str = "gpt-4o-mini";

/// Default completion service endpoint.
pub const COMPLETION_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP timeout for one completion call.
pub const COMPLETION_TIMEOUT_SECS: u64 = 30;

/// Token budget for the consolidated enrichment response.
pub const ENRICH_MAX_TOKENS: u32 = 1024;

/// Sampling temperature for enrichment (kept low for stable output).
pub const ENRICH_TEMPERATURE: f32 = 0.2;

/// Backoff before the single retry of a transient completion failure.
pub const ENRICH_RETRY_BACKOFF_MS: u64 = 500;

// =============================================================================
// ENRICHMENT OUTPUT
// =============================================================================

/// Longest cleaned title accepted from the model, in characters.
pub const MAX_CLEANED_TITLE_CHARS: usize = 200;

/// Lowest accepted complexity score.
pub const COMPLEXITY_MIN: i32 = 1;

/// Highest accepted complexity score.
pub const COMPLEXITY_MAX: i32 = 5;

/// Complexity value meaning "not scored yet".
pub const COMPLEXITY_UNSET: i32 = 0;

// =============================================================================
// REALTIME
// =============================================================================

/// Per-owner pub/sub channel prefix; the owner UUID is appended.
pub const UPDATES_CHANNEL_PREFIX: &str = "updates:user:";

/// Capacity of the in-process change bus.
pub const CHANGE_BUS_CAPACITY: usize = 256;

/// Postgres NOTIFY channel carrying `<owner_id>:<task_id>` trigger payloads.
pub const TASK_NOTIFY_CHANNEL: &str = "task_enrich";
