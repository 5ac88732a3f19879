//! # tidytask-core
//!
//! Core types, traits, and abstractions for tidytask task enrichment.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the storage, inference, and enrichment crates depend on:
//! - Task records, snapshots, and enrichment results
//! - Feature flags, subscription tiers, and the per-tier feature limit table
//! - Typed enrichment preferences
//! - Traits for every external seam (storage, completion, pub/sub)
//! - The shared error taxonomy
//!
//! ## Log fields
//!
//! Every crate logs through `tracing` with the same field vocabulary:
//! `subsystem` (`db`, `inference`, `enrich`, `worker`), `component`
//! (`pool`, `invoker`, `applier`, `publisher`, `trigger`, ...), `op`,
//! `task_id`, `owner_id`, `tier`, `features`, `depth`, `duration_ms`,
//! `model` and `error`.
//!
//! | Level | Used for |
//! |-------|----------|
//! | ERROR | Storage failures that need an operator |
//! | WARN  | Aborted runs, dropped triggers, fallbacks |
//! | INFO  | Startup/shutdown and completed runs |
//! | DEBUG | Selected features, discarded output, skips |
//! | TRACE | Prompt and response bodies |

pub mod defaults;
pub mod error;
pub mod events;
pub mod features;
pub mod limits;
pub mod models;
pub mod preferences;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{ChannelMessage, LocalChangeBus, TaskUpdatedMessage};
pub use features::{FeatureFlag, FeatureSet, Tier};
pub use limits::{FeatureLimits, UNLIMITED};
pub use models::*;
pub use preferences::{EnrichmentPreferences, PreferenceMode};
pub use traits::*;
