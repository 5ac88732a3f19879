//! # tidytask-db
//!
//! PostgreSQL storage layer for tidytask task enrichment.
//!
//! This crate provides:
//! - Connection pool management
//! - The task record accessor ([`PgTaskStore`])
//! - Tier and preference lookups ([`PgAccountRepository`])
//! - Daily feature usage metering ([`PgUsageStore`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidytask_db::{Database, TaskStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/tidytask").await?;
//!     let task = db.tasks.load(task_id, owner_id).await?;
//!     println!("{} (v{})", task.title, task.version);
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod pool;
pub mod tasks;
pub mod usage;

// Re-export core types
pub use tidytask_core::*;

pub use accounts::PgAccountRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use tasks::PgTaskStore;
pub use usage::PgUsageStore;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Task record accessor.
    pub tasks: PgTaskStore,
    /// Tier and preference lookups.
    pub accounts: PgAccountRepository,
    /// Feature usage metering.
    pub usage: PgUsageStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            tasks: PgTaskStore::new(pool.clone()),
            accounts: PgAccountRepository::new(pool.clone()),
            usage: PgUsageStore::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create a new Database instance with a custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run embedded schema migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}
