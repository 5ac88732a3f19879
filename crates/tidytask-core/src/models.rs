//! Domain models for task enrichment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::COMPLEXITY_UNSET;
use crate::{FeatureFlag, FeatureSet};

// =============================================================================
// ENTITIES
// =============================================================================

/// Kind of an extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Location,
    Organization,
    Email,
    Phone,
    Date,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Location => "location",
            EntityType::Organization => "organization",
            EntityType::Email => "email",
            EntityType::Phone => "phone",
            EntityType::Date => "date",
        }
    }

    /// Lenient parse for model output; accepts a few common synonyms.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "person" | "people" | "name" => Some(EntityType::Person),
            "location" | "place" | "address" => Some(EntityType::Location),
            "organization" | "organisation" | "org" | "company" => Some(EntityType::Organization),
            "email" | "e-mail" => Some(EntityType::Email),
            "phone" | "phone_number" | "telephone" => Some(EntityType::Phone),
            "date" => Some(EntityType::Date),
            _ => None,
        }
    }
}

/// An extracted `{type, value}` pair. Entity lists are replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub value: String,
}

impl Entity {
    pub fn new(entity_type: EntityType, value: impl Into<String>) -> Self {
        Self {
            entity_type,
            value: value.into(),
        }
    }
}

// =============================================================================
// TASK RECORD
// =============================================================================

/// The enrichment-relevant subset of a task row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub ai_cleaned_title: Option<String>,
    pub ai_cleaned_description: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub has_due_time: bool,
    /// 0 means not scored yet.
    pub complexity: i32,
    pub entities: Vec<Entity>,
    /// Incremented on every write.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// A fresh, unenriched task.
    pub fn new(id: Uuid, owner_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            id,
            owner_id,
            title: title.into(),
            description: None,
            ai_cleaned_title: None,
            ai_cleaned_description: None,
            due_at: None,
            has_due_time: false,
            complexity: COMPLEXITY_UNSET,
            entities: Vec::new(),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Description present with at least one non-whitespace character.
    pub fn has_description(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    pub fn is_complexity_unset(&self) -> bool {
        self.complexity == COMPLEXITY_UNSET
    }

    /// Capture the source fields for one enrichment run.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title.clone(),
            description: self.description.clone(),
            ai_cleaned_title: self.ai_cleaned_title.clone(),
            ai_cleaned_description: self.ai_cleaned_description.clone(),
            captured_at: Utc::now(),
        }
    }
}

/// Immutable capture of a task's source fields at invocation time.
///
/// Lives for one enrichment run and is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub ai_cleaned_title: Option<String>,
    pub ai_cleaned_description: Option<String>,
    pub captured_at: DateTime<Utc>,
}

// =============================================================================
// ENRICHMENT RESULT
// =============================================================================

/// An inferred due timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueDate {
    pub at: DateTime<Utc>,
    /// `false` for a bare date ("all day").
    pub has_time: bool,
}

/// Parsed output of one completion call.
///
/// `features` lists the flags attempted; the field values are nulled out by
/// conflict detection when their source text changed mid-flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentResult {
    pub cleaned_title: Option<String>,
    pub cleaned_description: Option<String>,
    pub entities: Option<Vec<Entity>>,
    pub complexity: Option<i32>,
    pub due: Option<DueDate>,
    pub features: FeatureSet,
}

impl EnrichmentResult {
    /// Null the field backing `feature` and drop the flag.
    pub fn discard(&mut self, feature: FeatureFlag) {
        match feature {
            FeatureFlag::CleanTitle => self.cleaned_title = None,
            FeatureFlag::CleanDescription => self.cleaned_description = None,
            FeatureFlag::EntityExtraction => self.entities = None,
            FeatureFlag::Complexity => self.complexity = None,
            FeatureFlag::DueDate => self.due = None,
        }
        self.features.remove(feature);
    }

    fn has_value(&self, feature: FeatureFlag) -> bool {
        match feature {
            FeatureFlag::CleanTitle => self.cleaned_title.is_some(),
            FeatureFlag::CleanDescription => self.cleaned_description.is_some(),
            FeatureFlag::EntityExtraction => self.entities.is_some(),
            FeatureFlag::Complexity => self.complexity.is_some(),
            FeatureFlag::DueDate => self.due.is_some(),
        }
    }

    /// Flags that still carry a value to write.
    pub fn landed_features(&self) -> FeatureSet {
        self.features.iter().filter(|f| self.has_value(*f)).collect()
    }

    /// Whether anything is left to persist.
    pub fn has_updates(&self) -> bool {
        !self.landed_features().is_empty()
    }

    /// The exact set of columns to write.
    pub fn to_updates(&self) -> TaskFieldUpdates {
        let keep = |f: FeatureFlag| self.features.contains(f);
        TaskFieldUpdates {
            ai_cleaned_title: self
                .cleaned_title
                .clone()
                .filter(|_| keep(FeatureFlag::CleanTitle)),
            ai_cleaned_description: self
                .cleaned_description
                .clone()
                .filter(|_| keep(FeatureFlag::CleanDescription)),
            entities: self
                .entities
                .clone()
                .filter(|_| keep(FeatureFlag::EntityExtraction)),
            complexity: self.complexity.filter(|_| keep(FeatureFlag::Complexity)),
            due: self.due.filter(|_| keep(FeatureFlag::DueDate)),
        }
    }
}

/// Fields written by one `apply_fields` call. `None` leaves a column as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFieldUpdates {
    pub ai_cleaned_title: Option<String>,
    pub ai_cleaned_description: Option<String>,
    pub entities: Option<Vec<Entity>>,
    pub complexity: Option<i32>,
    pub due: Option<DueDate>,
}

impl TaskFieldUpdates {
    pub fn is_empty(&self) -> bool {
        self.ai_cleaned_title.is_none()
            && self.ai_cleaned_description.is_none()
            && self.entities.is_none()
            && self.complexity.is_none()
            && self.due.is_none()
    }

    /// Apply to an in-memory record (version and timestamp excluded).
    pub fn apply_to(&self, record: &mut TaskRecord) {
        if let Some(ref title) = self.ai_cleaned_title {
            record.ai_cleaned_title = Some(title.clone());
        }
        if let Some(ref description) = self.ai_cleaned_description {
            record.ai_cleaned_description = Some(description.clone());
        }
        if let Some(ref entities) = self.entities {
            record.entities = entities.clone();
        }
        if let Some(complexity) = self.complexity {
            record.complexity = complexity;
        }
        if let Some(due) = self.due {
            record.due_at = Some(due.at);
            record.has_due_time = due.has_time;
        }
    }
}
