//! tidytask enrichment worker.
//!
//! Listens for task writes on a Postgres NOTIFY channel and schedules
//! background enrichment for each one.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgListener;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use tidytask_core::defaults::TASK_NOTIFY_CHANNEL;
use tidytask_core::{ChangePublisher, FeatureLimits, LocalChangeBus};
use tidytask_db::{log_pool_metrics, Database, PoolConfig};
use tidytask_enrich::{
    trigger, EnrichConfig, EnrichmentPipeline, EnrichmentTrigger, FanoutPublisher, RedisPublisher,
};
use tidytask_inference::{CompletionBackend, OpenAIBackend};

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

/// Parse a `<owner_id>:<task_id>` notification payload.
fn parse_notify_payload(payload: &str) -> Option<(Uuid, Uuid)> {
    let (owner, task) = payload.trim().split_once(':')?;
    Some((owner.parse().ok()?, task.parse().ok()?))
}

/// Redis when enabled and reachable, plus the in-process bus.
async fn build_publisher() -> FanoutPublisher {
    let mut publisher = FanoutPublisher::new();

    if env_flag("REDIS_ENABLED", true) {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        match RedisPublisher::connect(&url).await {
            Ok(redis) => publisher = publisher.with(Arc::new(redis)),
            Err(e) => warn!(error = %e, "Redis unavailable, publishing in-process only"),
        }
    } else {
        info!("Redis publishing disabled via REDIS_ENABLED=false");
    }

    publisher.with(Arc::new(LocalChangeBus::default()) as Arc<dyn ChangePublisher>)
}

async fn listen(listener: &mut PgListener, trigger: &EnrichmentTrigger) -> anyhow::Result<()> {
    loop {
        let notification = listener.recv().await?;
        match parse_notify_payload(notification.payload()) {
            Some((owner_id, task_id)) => {
                if !trigger.enqueue(owner_id, task_id) {
                    debug!(%task_id, "Trigger not queued");
                }
            }
            None => warn!(
                payload = notification.payload(),
                "Ignoring malformed task notification"
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   RUST_LOG    - standard env filter (default: "tidytask_worker=info,tidytask_enrich=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tidytask_worker=info,tidytask_enrich=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("tidytask-worker.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/tidytask".to_string());

    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env())
        .await
        .context("connecting to database")?;
    log_pool_metrics(&db.pool);

    if env_flag("DATABASE_MIGRATE", true) {
        info!("Running database migrations...");
        db.migrate().await?;
        info!("Database migrations complete");
    }

    let backend = OpenAIBackend::from_env()?;
    info!(model = backend.model_name(), "Completion backend initialized");

    let publisher = build_publisher().await;
    info!(sinks = publisher.len(), "Change publisher initialized");

    let config = EnrichConfig::from_env();
    let pipeline = EnrichmentPipeline::builder()
        .with_tasks(Arc::new(db.tasks.clone()))
        .with_preferences(Arc::new(db.accounts.clone()))
        .with_tiers(Arc::new(db.accounts.clone()))
        .with_usage(Arc::new(db.usage.clone()))
        .with_backend(Arc::new(backend))
        .with_publisher(Arc::new(publisher))
        .with_limits(FeatureLimits::from_env())
        .with_config(config.clone())
        .build()?;

    let (trigger, handle) = trigger::start(Arc::new(pipeline), &config);

    let channel =
        std::env::var("TASK_NOTIFY_CHANNEL").unwrap_or_else(|_| TASK_NOTIFY_CHANNEL.to_string());
    let mut listener = PgListener::connect_with(&db.pool)
        .await
        .context("opening notification listener")?;
    listener.listen(&channel).await?;
    info!(%channel, "Listening for task changes");

    tokio::select! {
        result = listen(&mut listener, &trigger) => {
            if let Err(e) = result {
                warn!(error = %e, "Notification listener stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    handle.shutdown_and_wait().await?;
    info!("Worker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notify_payload() {
        let owner = Uuid::new_v4();
        let task = Uuid::new_v4();
        assert_eq!(
            parse_notify_payload(&format!("{}:{}", owner, task)),
            Some((owner, task))
        );
    }

    #[test]
    fn test_parse_notify_payload_rejects_garbage() {
        assert_eq!(parse_notify_payload(""), None);
        assert_eq!(parse_notify_payload("not-a-uuid:also-not"), None);
        assert_eq!(parse_notify_payload(&Uuid::new_v4().to_string()), None);
    }
}
