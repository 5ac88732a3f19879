//! Consolidated enrichment prompt.
//!
//! One system prompt and one user message cover every selected feature, so
//! a run costs a single completion call however many features it needs.

use chrono::NaiveDate;

use tidytask_core::{FeatureFlag, FeatureSet};

const PREAMBLE: &str = "You tidy up entries in a personal to-do list. \
Tasks are short list items, not sentences. \
Return ONLY a single valid JSON object, no markdown and no explanation. \
Include only the keys listed below.";

/// A ready-to-send prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentPrompt {
    pub system: String,
    pub user: String,
}

/// Instruction block for one feature.
fn instructions(feature: FeatureFlag) -> &'static str {
    match feature {
        FeatureFlag::CleanTitle => {
            r#"- "title": the task title with spelling, casing and abbreviations fixed, kept short, no trailing period (string)
- "title_changed": whether "title" differs from the original (boolean)"#
        }
        FeatureFlag::CleanDescription => {
            r#"- "description": the description with spelling and grammar fixed, same meaning and language (string)
- "description_changed": whether "description" differs from the original (boolean)"#
        }
        FeatureFlag::EntityExtraction => {
            r#"- "entities": people, places and things mentioned, as an array of {"type": one of "person", "location", "organization", "email", "phone", "date", "value": string}. Use [] when there are none"#
        }
        FeatureFlag::Complexity => {
            r#"- "complexity": effort needed, integer from 1 (trivial, minutes) to 5 (multi-day project)"#
        }
        FeatureFlag::DueDate => {
            r#"- "due_date": when the task is due, resolved against today's date. Use "YYYY-MM-DD" when only a day is implied, "YYYY-MM-DDTHH:MM" when a time of day is given, or null when no date is implied"#
        }
    }
}

/// Build the prompt for `features`. `today` anchors relative dates such as
/// "tomorrow".
pub fn build(
    features: &FeatureSet,
    title: &str,
    description: Option<&str>,
    today: NaiveDate,
) -> EnrichmentPrompt {
    let keys = features
        .iter()
        .map(instructions)
        .collect::<Vec<_>>()
        .join("\n");

    let mut system = format!("{PREAMBLE}\n\nKeys:\n{keys}");
    if features.contains(FeatureFlag::DueDate) {
        system.push_str(&format!("\n\nToday is {} ({}).", today, today.format("%A")));
    }

    let mut user = format!("Title: {}", title.trim());
    if let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) {
        user.push_str("\nDescription: ");
        user.push_str(description);
    }

    EnrichmentPrompt { system, user }
}
