//! Task record accessor.
//!
//! The only code in the enrichment path that reads or writes task rows. No
//! row locks are taken: the enrichment applier re-reads and diffs before
//! writing, and every statement is scoped to `(id, owner_id)`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use tidytask_core::{Entity, Error, Result, TaskFieldUpdates, TaskRecord, TaskStore};

const SELECT_TASK: &str = r#"
SELECT id, owner_id, title, description, ai_cleaned_title, ai_cleaned_description,
       due_at, has_due_time, complexity, entities, version, updated_at
FROM task
WHERE id = $1 AND owner_id = $2
"#;

// NULL parameters leave the column untouched. due_at and has_due_time move
// together, keyed on $7.
const APPLY_FIELDS: &str = r#"
UPDATE task SET
    ai_cleaned_title       = COALESCE($3, ai_cleaned_title),
    ai_cleaned_description = COALESCE($4, ai_cleaned_description),
    entities               = COALESCE($5, entities),
    complexity             = COALESCE($6, complexity),
    due_at                 = COALESCE($7, due_at),
    has_due_time           = CASE WHEN $7::timestamptz IS NULL THEN has_due_time ELSE $8 END,
    version                = version + 1,
    updated_at             = $9
WHERE id = $1 AND owner_id = $2
"#;

/// PostgreSQL implementation of [`TaskStore`].
#[derive(Clone)]
pub struct PgTaskStore {
    pool: Pool<Postgres>,
}

impl PgTaskStore {
    /// Create a new PgTaskStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_task(row: &PgRow) -> Result<TaskRecord> {
    let entities: Json<Vec<Entity>> = row.try_get("entities")?;
    Ok(TaskRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        ai_cleaned_title: row.try_get("ai_cleaned_title")?,
        ai_cleaned_description: row.try_get("ai_cleaned_description")?,
        due_at: row.try_get("due_at")?,
        has_due_time: row.try_get("has_due_time")?,
        complexity: row.try_get("complexity")?,
        entities: entities.0,
        version: row.try_get("version")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl TaskStore for PgTaskStore {
    #[instrument(skip(self), fields(subsystem = "db", component = "tasks", op = "load"))]
    async fn load(&self, task_id: Uuid, owner_id: Uuid) -> Result<TaskRecord> {
        let row = sqlx::query(SELECT_TASK)
            .bind(task_id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::TaskNotFound(task_id))?;
        row_to_task(&row)
    }

    #[instrument(
        skip(self, updates),
        fields(subsystem = "db", component = "tasks", op = "apply_fields")
    )]
    async fn apply_fields(
        &self,
        task_id: Uuid,
        owner_id: Uuid,
        updates: &TaskFieldUpdates,
    ) -> Result<bool> {
        if updates.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query(APPLY_FIELDS)
            .bind(task_id)
            .bind(owner_id)
            .bind(updates.ai_cleaned_title.as_deref())
            .bind(updates.ai_cleaned_description.as_deref())
            .bind(updates.entities.as_ref().map(Json))
            .bind(updates.complexity)
            .bind(updates.due.map(|d| d.at))
            .bind(updates.due.is_some_and(|d| d.has_time))
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        let matched = result.rows_affected() > 0;
        debug!(%task_id, matched, "Applied enrichment fields");
        Ok(matched)
    }
}
