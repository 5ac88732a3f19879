//! # tidytask-enrich
//!
//! Asynchronous AI enrichment for tidytask tasks.
//!
//! After a task is created or its title/description changes, the trigger
//! schedules a background run that:
//! 1. loads the task and snapshots its source text
//! 2. selects the features still worth running (tier, preferences, unset
//!    fields, daily quota)
//! 3. asks the completion service for all of them in one call
//! 4. re-reads the task, discards output whose source text changed in the
//!    meantime, writes the rest and publishes what landed
//! 5. restarts itself (bounded) when the content changed mid-run
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidytask_enrich::{trigger, EnrichConfig, EnrichmentPipeline};
//!
//! let config = EnrichConfig::from_env();
//! let pipeline = EnrichmentPipeline::builder()
//!     .with_tasks(db.tasks.clone())
//!     .with_preferences(db.accounts.clone())
//!     .with_tiers(db.accounts.clone())
//!     .with_usage(db.usage.clone())
//!     .with_backend(Arc::new(OpenAIBackend::from_env()?))
//!     .with_publisher(Arc::new(LocalChangeBus::default()))
//!     .with_config(config.clone())
//!     .build()?;
//!
//! let (trigger, handle) = trigger::start(Arc::new(pipeline), &config);
//! trigger.enqueue(owner_id, task_id);
//!
//! handle.shutdown_and_wait().await?;
//! ```

pub mod config;
pub mod invoker;
pub mod parse;
pub mod pipeline;
pub mod prompt;
pub mod publisher;
pub mod quota;
pub mod reconcile;
pub mod selector;
pub mod trigger;

// Re-export core types
pub use tidytask_core::*;

pub use config::EnrichConfig;
pub use invoker::EnrichmentInvoker;
pub use pipeline::{EnrichJob, EnrichmentPipeline, PipelineBuilder, RunOutcome, SkipReason};
pub use publisher::{ChangeNotifier, FanoutPublisher, RedisPublisher};
pub use reconcile::{ConflictApplier, ConflictReport, ReconcileOutcome};
pub use selector::{select, select_for_restart};
pub use trigger::{EnrichmentTrigger, PipelineEvent, WorkerHandle};
