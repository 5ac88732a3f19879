//! Enrichment feature flags and subscription tiers.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// One named enrichment capability.
///
/// The snake_case name is used as the storage key for preferences and usage,
/// the prompt section key, and the value carried in realtime messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFlag {
    /// Rewrite the title as a concise list item.
    CleanTitle,
    /// Tidy up the free-text description.
    CleanDescription,
    /// Extract people, places, organizations, emails, phones, and dates.
    EntityExtraction,
    /// Score effort on a 1-5 scale.
    Complexity,
    /// Infer a due date (with or without time of day).
    DueDate,
}

impl FeatureFlag {
    /// All flags, in prompt order.
    pub const ALL: [FeatureFlag; 5] = [
        FeatureFlag::CleanTitle,
        FeatureFlag::CleanDescription,
        FeatureFlag::EntityExtraction,
        FeatureFlag::Complexity,
        FeatureFlag::DueDate,
    ];

    /// Stable storage/wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFlag::CleanTitle => "clean_title",
            FeatureFlag::CleanDescription => "clean_description",
            FeatureFlag::EntityExtraction => "entity_extraction",
            FeatureFlag::Complexity => "complexity",
            FeatureFlag::DueDate => "due_date",
        }
    }

    /// Whether this feature reads the title and description together, so
    /// an edit to either one invalidates it. Cleaned title and description
    /// each depend on one field only.
    pub fn depends_on_all_content(&self) -> bool {
        matches!(self, FeatureFlag::EntityExtraction | FeatureFlag::Complexity)
    }
}

impl fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureFlag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureFlag::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown feature: {}", s)))
    }
}

/// An ordered set of feature flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeSet<FeatureFlag>);

impl FeatureSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flag: FeatureFlag) -> bool {
        self.0.insert(flag)
    }

    pub fn remove(&mut self, flag: FeatureFlag) -> bool {
        self.0.remove(&flag)
    }

    pub fn contains(&self, flag: FeatureFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = FeatureFlag> + '_ {
        self.0.iter().copied()
    }

    /// Names in order, for logs and payloads.
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|f| f.as_str()).collect()
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names().join(","))
    }
}

impl FromIterator<FeatureFlag> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = FeatureFlag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[FeatureFlag; N]> for FeatureSet {
    fn from(flags: [FeatureFlag; N]) -> Self {
        flags.into_iter().collect()
    }
}

/// Subscription level gating feature eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Light,
    Premium,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Light, Tier::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Light => "light",
            Tier::Premium => "premium",
        }
    }

    /// Paid tiers unlock entity extraction.
    pub fn is_paid(&self) -> bool {
        matches!(self, Tier::Light | Tier::Premium)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "light" => Ok(Tier::Light),
            "premium" => Ok(Tier::Premium),
            other => Err(Error::InvalidInput(format!("Unknown tier: {}", other))),
        }
    }
}
