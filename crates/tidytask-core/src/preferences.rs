//! Per-owner enrichment preferences.
//!
//! Stored as a loose `feature name -> "auto" | "ask"` JSON map on the account;
//! converted to the typed struct at the storage boundary only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::FeatureFlag;

/// How a feature may run for an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceMode {
    /// Run automatically on create/update.
    #[default]
    Auto,
    /// Never run automatically; only when the user asks for it.
    Ask,
}

impl PreferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceMode::Auto => "auto",
            PreferenceMode::Ask => "ask",
        }
    }

    /// Lenient parse: anything other than "ask" means auto.
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("ask") {
            PreferenceMode::Ask
        } else {
            PreferenceMode::Auto
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, PreferenceMode::Auto)
    }
}

/// Typed enrichment preferences, one field per known feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrichmentPreferences {
    pub clean_title: PreferenceMode,
    pub clean_description: PreferenceMode,
    pub entity_extraction: PreferenceMode,
    pub complexity: PreferenceMode,
    pub due_date: PreferenceMode,
}

impl EnrichmentPreferences {
    /// Every feature on auto. Also what an owner with no stored settings gets.
    pub fn all_auto() -> Self {
        Self::default()
    }

    pub fn mode(&self, feature: FeatureFlag) -> PreferenceMode {
        match feature {
            FeatureFlag::CleanTitle => self.clean_title,
            FeatureFlag::CleanDescription => self.clean_description,
            FeatureFlag::EntityExtraction => self.entity_extraction,
            FeatureFlag::Complexity => self.complexity,
            FeatureFlag::DueDate => self.due_date,
        }
    }

    pub fn with_mode(mut self, feature: FeatureFlag, mode: PreferenceMode) -> Self {
        let slot = match feature {
            FeatureFlag::CleanTitle => &mut self.clean_title,
            FeatureFlag::CleanDescription => &mut self.clean_description,
            FeatureFlag::EntityExtraction => &mut self.entity_extraction,
            FeatureFlag::Complexity => &mut self.complexity,
            FeatureFlag::DueDate => &mut self.due_date,
        };
        *slot = mode;
        self
    }

    pub fn is_auto(&self, feature: FeatureFlag) -> bool {
        self.mode(feature).is_auto()
    }

    /// Convert from the stored map. Unknown keys are ignored, missing keys
    /// default to auto.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        map.iter().fold(Self::default(), |prefs, (key, value)| {
            match key.parse::<FeatureFlag>() {
                Ok(feature) => prefs.with_mode(feature, PreferenceMode::parse_lenient(value)),
                Err(_) => prefs,
            }
        })
    }

    /// Convert to the stored map, one entry per known feature.
    pub fn to_map(&self) -> HashMap<String, String> {
        FeatureFlag::ALL
            .iter()
            .map(|f| (f.as_str().to_string(), self.mode(*f).as_str().to_string()))
            .collect()
    }
}
