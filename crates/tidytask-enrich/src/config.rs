//! Enrichment pipeline configuration.

use std::time::Duration;

use tidytask_core::defaults;

/// Configuration for the enrichment pipeline and its worker pool.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Whether triggers are accepted at all.
    pub enabled: bool,
    /// Maximum number of concurrent pipeline runs.
    pub workers: usize,
    /// Capacity of the trigger queue.
    pub queue_capacity: usize,
    /// Outer timeout for one run, in seconds.
    pub run_timeout_secs: u64,
    /// Maximum restart depth after a content change.
    pub max_restart_depth: u32,
    /// `max_tokens` sent with every completion request.
    pub max_tokens: u32,
    /// Sampling temperature for completion requests.
    pub temperature: f32,
    /// Delay before the single retry of a transient completion failure.
    pub retry_backoff_ms: u64,
    /// Channel prefix; the owner id is appended.
    pub channel_prefix: String,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: defaults::ENRICH_WORKERS,
            queue_capacity: defaults::ENRICH_QUEUE_CAPACITY,
            run_timeout_secs: defaults::ENRICH_RUN_TIMEOUT_SECS,
            max_restart_depth: defaults::ENRICH_MAX_RESTART_DEPTH,
            max_tokens: defaults::ENRICH_MAX_TOKENS,
            temperature: defaults::ENRICH_TEMPERATURE,
            retry_backoff_ms: defaults::ENRICH_RETRY_BACKOFF_MS,
            channel_prefix: defaults::UPDATES_CHANNEL_PREFIX.to_string(),
        }
    }
}

impl EnrichConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `ENRICH_ENABLED` | `true` | Enable/disable enrichment |
    /// | `ENRICH_WORKERS` | `4` | Max concurrent runs |
    /// | `ENRICH_QUEUE_CAPACITY` | `256` | Pending trigger capacity |
    /// | `ENRICH_RUN_TIMEOUT_SECS` | `75` | Per-run timeout |
    /// | `ENRICH_MAX_RESTART_DEPTH` | `3` | Restart bound on content change |
    /// | `ENRICH_MAX_TOKENS` | `1024` | Completion `max_tokens` |
    /// | `ENRICH_TEMPERATURE` | `0.2` | Completion temperature |
    /// | `ENRICH_RETRY_BACKOFF_MS` | `500` | Backoff before the transient retry |
    /// | `ENRICH_CHANNEL_PREFIX` | `updates:user:` | Pub/sub channel prefix |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to
    /// the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> T {
            lookup(key)
                .and_then(|v| v.trim().parse::<T>().ok())
                .unwrap_or(default)
        }

        let d = Self::default();
        Self {
            enabled: lookup("ENRICH_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(d.enabled),
            workers: parsed(&lookup, "ENRICH_WORKERS", d.workers).max(1),
            queue_capacity: parsed(&lookup, "ENRICH_QUEUE_CAPACITY", d.queue_capacity).max(1),
            run_timeout_secs: parsed(&lookup, "ENRICH_RUN_TIMEOUT_SECS", d.run_timeout_secs)
                .max(1),
            max_restart_depth: parsed(&lookup, "ENRICH_MAX_RESTART_DEPTH", d.max_restart_depth),
            max_tokens: parsed(&lookup, "ENRICH_MAX_TOKENS", d.max_tokens),
            temperature: parsed(&lookup, "ENRICH_TEMPERATURE", d.temperature),
            retry_backoff_ms: parsed(&lookup, "ENRICH_RETRY_BACKOFF_MS", d.retry_backoff_ms),
            channel_prefix: lookup("ENRICH_CHANNEL_PREFIX")
                .filter(|v| !v.is_empty())
                .unwrap_or(d.channel_prefix),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_run_timeout_secs(mut self, secs: u64) -> Self {
        self.run_timeout_secs = secs;
        self
    }

    pub fn with_max_restart_depth(mut self, depth: u32) -> Self {
        self.max_restart_depth = depth;
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
