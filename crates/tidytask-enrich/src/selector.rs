//! Feature selection.
//!
//! Every rule guards against redoing work: once the target field is
//! populated its feature is never selected again, so a second pass over an
//! enriched record yields the empty set.

use tidytask_core::{EnrichmentPreferences, FeatureFlag, FeatureSet, TaskRecord, Tier};

/// Features that should run for `record` given the owner's tier and
/// preferences.
pub fn select(tier: Tier, record: &TaskRecord, preferences: &EnrichmentPreferences) -> FeatureSet {
    FeatureFlag::ALL
        .into_iter()
        .filter(|feature| preferences.is_auto(*feature))
        .filter(|feature| is_eligible(tier, record, *feature))
        .collect()
}

/// Selection used to decide whether a content change warrants a fresh run:
/// preferences are ignored, only tier eligibility and unset fields count.
pub fn select_for_restart(tier: Tier, record: &TaskRecord) -> FeatureSet {
    select(tier, record, &EnrichmentPreferences::all_auto())
}

fn is_eligible(tier: Tier, record: &TaskRecord, feature: FeatureFlag) -> bool {
    match feature {
        FeatureFlag::CleanTitle => record.ai_cleaned_title.is_none(),
        FeatureFlag::CleanDescription => {
            record.has_description() && record.ai_cleaned_description.is_none()
        }
        FeatureFlag::DueDate => record.due_at.is_none(),
        FeatureFlag::Complexity => record.is_complexity_unset(),
        FeatureFlag::EntityExtraction => tier.is_paid() && record.entities.is_empty(),
    }
}
