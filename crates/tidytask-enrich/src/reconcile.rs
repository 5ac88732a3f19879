//! Conflict detection and write-back.
//!
//! Model output is computed from a snapshot and may be stale by the time it
//! is written. Every derived field is tied to the source text it came from;
//! it is only written if that source is unchanged in a fresh read.

use std::sync::Arc;

use tracing::{debug, instrument};

use tidytask_core::{
    EnrichmentResult, Error, FeatureFlag, FeatureSet, Result, TaskRecord, TaskSnapshot, TaskStore,
    Tier,
};

use crate::publisher::ChangeNotifier;
use crate::selector;

/// Which source texts moved between snapshot and write time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub title_changed: bool,
    pub description_changed: bool,
}

impl ConflictReport {
    /// Compare a fresh read against the snapshot. A cleaned value that
    /// appeared since the snapshot counts as a change: another writer got
    /// there first.
    pub fn detect(snapshot: &TaskSnapshot, current: &TaskRecord) -> Self {
        let title_changed = current.title != snapshot.title
            || (snapshot.ai_cleaned_title.is_none() && current.ai_cleaned_title.is_some());
        let description_changed = current.description != snapshot.description
            || (snapshot.ai_cleaned_description.is_none()
                && current.ai_cleaned_description.is_some());
        Self {
            title_changed,
            description_changed,
        }
    }

    pub fn content_changed(&self) -> bool {
        self.title_changed || self.description_changed
    }

    /// Null out every result field whose source changed and drop its flag.
    /// Returns the dropped flags.
    pub fn apply(&self, result: &mut EnrichmentResult) -> FeatureSet {
        let mut dropped = FeatureSet::new();
        let mut discard = |result: &mut EnrichmentResult, flag: FeatureFlag| {
            if result.features.contains(flag) {
                dropped.insert(flag);
            }
            result.discard(flag);
        };

        if self.title_changed {
            discard(result, FeatureFlag::CleanTitle);
        }
        if self.description_changed {
            discard(result, FeatureFlag::CleanDescription);
        }
        if self.content_changed() {
            for flag in FeatureFlag::ALL
                .into_iter()
                .filter(FeatureFlag::depends_on_all_content)
            {
                discard(result, flag);
            }
        }
        dropped
    }
}

/// What reconciliation did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub report: ConflictReport,
    /// Flags discarded because their source changed.
    pub dropped: FeatureSet,
    /// Flags written; empty when nothing survived or the row vanished.
    pub written: FeatureSet,
    /// Set when the task was deleted or reassigned mid-flight.
    pub vanished: bool,
    /// Whether the change message went out.
    pub published: bool,
    /// Features a fresh run should pick up after a content change.
    pub restart: FeatureSet,
}

/// Re-reads, discards stale output, writes survivors and publishes.
#[derive(Clone)]
pub struct ConflictApplier {
    tasks: Arc<dyn TaskStore>,
    notifier: ChangeNotifier,
}

impl ConflictApplier {
    pub fn new(tasks: Arc<dyn TaskStore>, notifier: ChangeNotifier) -> Self {
        Self { tasks, notifier }
    }

    /// Reconcile `result` (computed from `snapshot`) with the current row and
    /// persist what is still valid.
    ///
    /// Storage errors are returned; publish failures are not.
    #[instrument(
        skip_all,
        fields(
            subsystem = "enrich",
            component = "applier",
            task_id = %snapshot.id,
            owner_id = %snapshot.owner_id
        )
    )]
    pub async fn reconcile_and_apply(
        &self,
        tier: Tier,
        snapshot: &TaskSnapshot,
        mut result: EnrichmentResult,
    ) -> Result<ReconcileOutcome> {
        let current = match self.tasks.load(snapshot.id, snapshot.owner_id).await {
            Ok(record) => record,
            Err(Error::TaskNotFound(_)) => {
                debug!("Task vanished before write-back");
                return Ok(ReconcileOutcome {
                    vanished: true,
                    ..Default::default()
                });
            }
            Err(e) => return Err(e),
        };

        let report = ConflictReport::detect(snapshot, &current);
        let dropped = report.apply(&mut result);
        if !dropped.is_empty() {
            debug!(
                title_changed = report.title_changed,
                description_changed = report.description_changed,
                %dropped,
                "Discarded stale enrichment output"
            );
        }

        let mut outcome = ReconcileOutcome {
            report,
            dropped,
            ..Default::default()
        };

        let updates = result.to_updates();

        if report.content_changed() {
            // Eligibility is judged on the row as it will be after this write.
            let mut after = current.clone();
            updates.apply_to(&mut after);
            outcome.restart = selector::select_for_restart(tier, &after);
        }

        if updates.is_empty() {
            debug!("Nothing left to write");
            return Ok(outcome);
        }

        if !self
            .tasks
            .apply_fields(snapshot.id, snapshot.owner_id, &updates)
            .await?
        {
            debug!("Task vanished during write-back, nothing written");
            outcome.vanished = true;
            outcome.restart = FeatureSet::new();
            return Ok(outcome);
        }

        outcome.written = result.landed_features();
        outcome.published = self
            .notifier
            .notify(snapshot.owner_id, snapshot.id, &result)
            .await;

        Ok(outcome)
    }
}
