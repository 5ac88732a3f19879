//! One enrichment run: load, select, gate, invoke, reconcile.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tidytask_core::{
    ChangePublisher, CompletionBackend, Error, FeatureLimits, FeatureSet, PreferenceStore,
    Result, TaskStore, TierLookup, UsageStore,
};

use crate::config::EnrichConfig;
use crate::invoker::EnrichmentInvoker;
use crate::publisher::ChangeNotifier;
use crate::reconcile::{ConflictApplier, ReconcileOutcome};
use crate::{quota, selector};

/// A unit of work for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnrichJob {
    pub owner_id: Uuid,
    pub task_id: Uuid,
    /// 0 for a trigger from a record write, +1 for each content-change restart.
    pub depth: u32,
}

impl EnrichJob {
    pub fn new(owner_id: Uuid, task_id: Uuid) -> Self {
        Self {
            owner_id,
            task_id,
            depth: 0,
        }
    }

    /// The follow-up run after a content change.
    pub fn restart(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..*self
        }
    }

    pub fn key(&self) -> (Uuid, Uuid) {
        (self.owner_id, self.task_id)
    }
}

/// Why a run stopped before calling the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The task does not exist (or not for this owner).
    Missing,
    /// Every feature is already done or set to `ask`.
    NothingSelected,
    /// Every selected feature is over today's quota.
    QuotaExhausted,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Missing => "missing",
            SkipReason::NothingSelected => "nothing_selected",
            SkipReason::QuotaExhausted => "quota_exhausted",
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Completed {
        /// Features sent to the model.
        attempted: FeatureSet,
        reconcile: ReconcileOutcome,
        /// Follow-up run to enqueue, if the content changed and the depth
        /// bound allows it.
        restart: Option<EnrichJob>,
    },
}

impl RunOutcome {
    /// Features written by this run.
    pub fn written(&self) -> FeatureSet {
        match self {
            RunOutcome::Completed { reconcile, .. } => reconcile.written.clone(),
            RunOutcome::Skipped(_) => FeatureSet::new(),
        }
    }

    pub fn restart(&self) -> Option<EnrichJob> {
        match self {
            RunOutcome::Completed { restart, .. } => *restart,
            RunOutcome::Skipped(_) => None,
        }
    }
}

/// The enrichment pipeline. Cheap to share behind an `Arc`; holds no
/// per-run state.
pub struct EnrichmentPipeline {
    tasks: Arc<dyn TaskStore>,
    preferences: Arc<dyn PreferenceStore>,
    tiers: Arc<dyn TierLookup>,
    usage: Arc<dyn UsageStore>,
    limits: Arc<FeatureLimits>,
    invoker: EnrichmentInvoker,
    applier: ConflictApplier,
    max_restart_depth: u32,
}

impl EnrichmentPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Run the pipeline once for `job`.
    ///
    /// Storage, completion and parse errors abort the run with nothing
    /// written. A missing task is a skip, not an error.
    #[instrument(
        skip_all,
        fields(
            subsystem = "enrich",
            component = "pipeline",
            task_id = %job.task_id,
            owner_id = %job.owner_id,
            depth = job.depth
        )
    )]
    pub async fn run(&self, job: EnrichJob) -> Result<RunOutcome> {
        let start = Instant::now();

        let record = match self.tasks.load(job.task_id, job.owner_id).await {
            Ok(record) => record,
            Err(Error::TaskNotFound(_)) => {
                debug!("Task not found, skipping");
                return Ok(RunOutcome::Skipped(SkipReason::Missing));
            }
            Err(e) => return Err(e),
        };
        let snapshot = record.snapshot();

        let tier = self.tiers.tier(job.owner_id).await?;
        let preferences = self.preferences.preferences(job.owner_id).await?;

        let selected = selector::select(tier, &record, &preferences);
        if selected.is_empty() {
            debug!(%tier, "No features selected");
            return Ok(RunOutcome::Skipped(SkipReason::NothingSelected));
        }

        let features =
            quota::gate(&self.limits, self.usage.as_ref(), job.owner_id, tier, selected).await;
        if features.is_empty() {
            info!(%tier, "All selected features over daily limit");
            return Ok(RunOutcome::Skipped(SkipReason::QuotaExhausted));
        }
        debug!(%tier, %features, "Features selected");

        let result = self
            .invoker
            .invoke(
                tier,
                &snapshot.title,
                snapshot.description.as_deref(),
                &features,
            )
            .await?;

        if let Err(e) = self.usage.record(job.owner_id, &features).await {
            warn!(error = %e, "Failed to record feature usage");
        }

        let reconcile = self
            .applier
            .reconcile_and_apply(tier, &snapshot, result)
            .await?;

        let restart = if reconcile.restart.is_empty() {
            None
        } else if job.depth < self.max_restart_depth {
            debug!(restart = %reconcile.restart, "Content changed mid-run, restarting");
            Some(job.restart())
        } else {
            warn!(
                max_restart_depth = self.max_restart_depth,
                "Content changed mid-run, restart depth exhausted"
            );
            None
        };

        info!(
            %features,
            written = %reconcile.written,
            dropped = %reconcile.dropped,
            restart = restart.is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Enrichment run completed"
        );

        Ok(RunOutcome::Completed {
            attempted: features,
            reconcile,
            restart,
        })
    }
}

/// Builder wiring the pipeline's collaborators.
#[derive(Default)]
pub struct PipelineBuilder {
    tasks: Option<Arc<dyn TaskStore>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    tiers: Option<Arc<dyn TierLookup>>,
    usage: Option<Arc<dyn UsageStore>>,
    backend: Option<Arc<dyn CompletionBackend>>,
    publisher: Option<Arc<dyn ChangePublisher>>,
    limits: Option<Arc<FeatureLimits>>,
    config: EnrichConfig,
}

impl PipelineBuilder {
    pub fn with_tasks(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_tiers(mut self, tiers: Arc<dyn TierLookup>) -> Self {
        self.tiers = Some(tiers);
        self
    }

    pub fn with_usage(mut self, usage: Arc<dyn UsageStore>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ChangePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Defaults to [`FeatureLimits::default`].
    pub fn with_limits(mut self, limits: FeatureLimits) -> Self {
        self.limits = Some(Arc::new(limits));
        self
    }

    pub fn with_config(mut self, config: EnrichConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the pipeline. Fails with `Error::Config` naming the first
    /// missing collaborator.
    pub fn build(self) -> Result<EnrichmentPipeline> {
        fn require<T>(value: Option<T>, name: &str) -> Result<T> {
            value.ok_or_else(|| Error::Config(format!("Enrichment pipeline needs a {}", name)))
        }

        let tasks = require(self.tasks, "task store")?;
        let publisher = require(self.publisher, "change publisher")?;
        let backend = require(self.backend, "completion backend")?;

        Ok(EnrichmentPipeline {
            preferences: require(self.preferences, "preference store")?,
            tiers: require(self.tiers, "tier lookup")?,
            usage: require(self.usage, "usage store")?,
            limits: self.limits.unwrap_or_default(),
            invoker: EnrichmentInvoker::new(backend, &self.config),
            applier: ConflictApplier::new(
                tasks.clone(),
                ChangeNotifier::new(publisher, self.config.channel_prefix.clone()),
            ),
            max_restart_depth: self.config.max_restart_depth,
            tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_increments_depth() {
        let job = EnrichJob::new(Uuid::new_v4(), Uuid::new_v4());
        let next = job.restart().restart();
        assert_eq!(next.depth, 2);
        assert_eq!(next.key(), job.key());
    }

    #[test]
    fn test_builder_reports_missing_collaborator() {
        let err = EnrichmentPipeline::builder().build().err().unwrap();
        assert!(matches!(err, Error::Config(ref m) if m.contains("task store")));
    }

    #[test]
    fn test_skipped_outcome_writes_nothing() {
        let outcome = RunOutcome::Skipped(SkipReason::NothingSelected);
        assert!(outcome.written().is_empty());
        assert!(outcome.restart().is_none());
        assert_eq!(SkipReason::QuotaExhausted.as_str(), "quota_exhausted");
    }
}
