//! Per-tier daily feature limits.
//!
//! A typed tier × feature table, built once at startup and shared read-only
//! (`Arc<FeatureLimits>`). A limit of [`UNLIMITED`] never gates; `0` disables
//! the feature for the tier outright.

use tracing::{debug, warn};

use crate::{FeatureFlag, Tier};

/// Sentinel for "no daily cap".
pub const UNLIMITED: i32 = -1;

const FEATURES: usize = FeatureFlag::ALL.len();
const TIERS: usize = Tier::ALL.len();

fn feature_index(flag: FeatureFlag) -> usize {
    match flag {
        FeatureFlag::CleanTitle => 0,
        FeatureFlag::CleanDescription => 1,
        FeatureFlag::EntityExtraction => 2,
        FeatureFlag::Complexity => 3,
        FeatureFlag::DueDate => 4,
    }
}

fn tier_index(tier: Tier) -> usize {
    match tier {
        Tier::Free => 0,
        Tier::Light => 1,
        Tier::Premium => 2,
    }
}

/// Daily usage limits indexed by tier and feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLimits {
    table: [[i32; FEATURES]; TIERS],
}

impl Default for FeatureLimits {
    /// Column order: clean_title, clean_description, entity_extraction,
    /// complexity, due_date.
    fn default() -> Self {
        Self {
            table: [
                // free
                [20, 10, 0, 20, 20],
                // light
                [100, 50, 50, 100, 100],
                // premium
                [UNLIMITED, UNLIMITED, UNLIMITED, UNLIMITED, UNLIMITED],
            ],
        }
    }
}

impl FeatureLimits {
    /// Build from defaults plus environment overrides.
    ///
    /// Each cell can be overridden with `ENRICH_LIMIT_<TIER>_<FEATURE>`, e.g.
    /// `ENRICH_LIMIT_FREE_ENTITY_EXTRACTION=5`. Unparseable values are
    /// ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults plus overrides resolved through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut limits = Self::default();
        for tier in Tier::ALL {
            for feature in FeatureFlag::ALL {
                let key = Self::env_key(tier, feature);
                let Some(raw) = lookup(&key) else {
                    continue;
                };
                match raw.trim().parse::<i32>() {
                    Ok(value) if value >= UNLIMITED => {
                        debug!(%key, value, "Feature limit override");
                        limits.table[tier_index(tier)][feature_index(feature)] = value;
                    }
                    _ => warn!(%key, %raw, "Ignoring invalid feature limit override"),
                }
            }
        }
        limits
    }

    /// Environment variable name for one cell.
    pub fn env_key(tier: Tier, feature: FeatureFlag) -> String {
        format!(
            "ENRICH_LIMIT_{}_{}",
            tier.as_str().to_ascii_uppercase(),
            feature.as_str().to_ascii_uppercase()
        )
    }

    /// Set one cell.
    pub fn with_limit(mut self, tier: Tier, feature: FeatureFlag, limit: i32) -> Self {
        self.table[tier_index(tier)][feature_index(feature)] = limit.max(UNLIMITED);
        self
    }

    /// Daily limit for a tier and feature.
    pub fn limit(&self, tier: Tier, feature: FeatureFlag) -> i32 {
        self.table[tier_index(tier)][feature_index(feature)]
    }

    /// Whether the feature may run at all for this tier.
    pub fn is_enabled(&self, tier: Tier, feature: FeatureFlag) -> bool {
        self.limit(tier, feature) != 0
    }

    /// Whether one more use fits under today's limit.
    pub fn allows(&self, tier: Tier, feature: FeatureFlag, used_today: i64) -> bool {
        match self.limit(tier, feature) {
            UNLIMITED => true,
            limit => used_today < i64::from(limit),
        }
    }
}
