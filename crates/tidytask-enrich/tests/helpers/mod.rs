//! In-memory collaborators for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use tidytask_core::{
    EnrichmentPreferences, Error, FeatureFlag, FeatureLimits, FeatureSet, LocalChangeBus,
    PreferenceStore, Result, TaskFieldUpdates, TaskRecord, TaskStore, Tier, TierLookup,
    UsageStore,
};
use tidytask_enrich::{EnrichConfig, EnrichmentPipeline};
use tidytask_inference::MockCompletionBackend;

/// Task rows keyed by id.
#[derive(Clone, Default)]
pub struct MemoryTaskStore {
    rows: Arc<Mutex<HashMap<Uuid, TaskRecord>>>,
    writes: Arc<Mutex<Vec<TaskFieldUpdates>>>,
}

impl MemoryTaskStore {
    pub fn insert(&self, record: TaskRecord) {
        self.rows.lock().unwrap().insert(record.id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<TaskRecord> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    /// A user edit: new title, version bump.
    pub fn edit_title(&self, id: Uuid, title: &str) {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).expect("task exists");
        row.title = title.to_string();
        row.version += 1;
        row.updated_at = Utc::now();
    }

    /// A user edit: new description, version bump.
    pub fn edit_description(&self, id: Uuid, description: Option<&str>) {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).expect("task exists");
        row.description = description.map(str::to_string);
        row.version += 1;
        row.updated_at = Utc::now();
    }

    pub fn delete(&self, id: Uuid) {
        self.rows.lock().unwrap().remove(&id);
    }

    /// Every successful `apply_fields` call, in order.
    pub fn writes(&self) -> Vec<TaskFieldUpdates> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn load(&self, task_id: Uuid, owner_id: Uuid) -> Result<TaskRecord> {
        self.rows
            .lock()
            .unwrap()
            .get(&task_id)
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .ok_or(Error::TaskNotFound(task_id))
    }

    async fn apply_fields(
        &self,
        task_id: Uuid,
        owner_id: Uuid,
        updates: &TaskFieldUpdates,
    ) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&task_id).filter(|r| r.owner_id == owner_id) {
            Some(row) => {
                updates.apply_to(row);
                row.version += 1;
                row.updated_at = Utc::now();
                self.writes.lock().unwrap().push(updates.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Tier and preferences per owner.
#[derive(Clone, Default)]
pub struct MemoryAccounts {
    tiers: Arc<Mutex<HashMap<Uuid, Tier>>>,
    preferences: Arc<Mutex<HashMap<Uuid, EnrichmentPreferences>>>,
}

impl MemoryAccounts {
    pub fn set_tier(&self, owner_id: Uuid, tier: Tier) {
        self.tiers.lock().unwrap().insert(owner_id, tier);
    }

    pub fn set_preferences(&self, owner_id: Uuid, preferences: EnrichmentPreferences) {
        self.preferences.lock().unwrap().insert(owner_id, preferences);
    }
}

#[async_trait]
impl TierLookup for MemoryAccounts {
    async fn tier(&self, owner_id: Uuid) -> Result<Tier> {
        Ok(self
            .tiers
            .lock()
            .unwrap()
            .get(&owner_id)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl PreferenceStore for MemoryAccounts {
    async fn preferences(&self, owner_id: Uuid) -> Result<EnrichmentPreferences> {
        Ok(self
            .preferences
            .lock()
            .unwrap()
            .get(&owner_id)
            .copied()
            .unwrap_or_default())
    }
}

/// Usage counters; ignores the day boundary.
#[derive(Clone, Default)]
pub struct MemoryUsage {
    counts: Arc<Mutex<HashMap<(Uuid, FeatureFlag), i64>>>,
}

impl MemoryUsage {
    pub fn set(&self, owner_id: Uuid, feature: FeatureFlag, count: i64) {
        self.counts.lock().unwrap().insert((owner_id, feature), count);
    }

    pub fn get(&self, owner_id: Uuid, feature: FeatureFlag) -> i64 {
        self.counts
            .lock()
            .unwrap()
            .get(&(owner_id, feature))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl UsageStore for MemoryUsage {
    async fn count_today(&self, owner_id: Uuid, feature: FeatureFlag) -> Result<i64> {
        Ok(self.get(owner_id, feature))
    }

    async fn record(&self, owner_id: Uuid, features: &FeatureSet) -> Result<()> {
        let mut counts = self.counts.lock().unwrap();
        for feature in features.iter() {
            *counts.entry((owner_id, feature)).or_insert(0) += 1;
        }
        Ok(())
    }
}

/// Everything a pipeline test needs, sharing state with the pipeline.
pub struct Harness {
    pub tasks: MemoryTaskStore,
    pub accounts: MemoryAccounts,
    pub usage: MemoryUsage,
    pub bus: LocalChangeBus,
    pub backend: MockCompletionBackend,
    pub owner_id: Uuid,
}

impl Harness {
    pub fn new(backend: MockCompletionBackend) -> Self {
        Self::with_tasks(MemoryTaskStore::default(), backend)
    }

    /// Share a store the backend's hook already holds.
    pub fn with_tasks(tasks: MemoryTaskStore, backend: MockCompletionBackend) -> Self {
        Self {
            tasks,
            accounts: MemoryAccounts::default(),
            usage: MemoryUsage::default(),
            bus: LocalChangeBus::default(),
            backend,
            owner_id: Uuid::new_v4(),
        }
    }

    pub fn config() -> EnrichConfig {
        EnrichConfig::default().with_retry_backoff_ms(1)
    }

    /// Insert a task for the harness owner and return its id.
    pub fn add_task(&self, title: &str, description: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.insert_task(id, title, description);
        id
    }

    pub fn insert_task(&self, id: Uuid, title: &str, description: Option<&str>) {
        let mut record = TaskRecord::new(id, self.owner_id, title);
        record.description = description.map(str::to_string);
        self.tasks.insert(record);
    }

    pub fn pipeline(&self) -> EnrichmentPipeline {
        self.pipeline_with(Self::config())
    }

    pub fn pipeline_with(&self, config: EnrichConfig) -> EnrichmentPipeline {
        EnrichmentPipeline::builder()
            .with_tasks(Arc::new(self.tasks.clone()))
            .with_preferences(Arc::new(self.accounts.clone()))
            .with_tiers(Arc::new(self.accounts.clone()))
            .with_usage(Arc::new(self.usage.clone()))
            .with_backend(Arc::new(self.backend.clone()))
            .with_publisher(Arc::new(self.bus.clone()))
            .with_limits(FeatureLimits::default())
            .with_config(config)
            .build()
            .expect("pipeline builds")
    }
}
