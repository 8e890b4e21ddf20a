use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::DatabaseConfig;

/// Connect to Postgres, retrying with backoff while the server comes up.
///
/// # Errors
///
/// Returns the last connection error once the retry budget is spent.
pub async fn connect_with_retry(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let retry_deadline = Duration::from_secs(60); // overall retry budget
    let max_interval = Duration::from_secs(30); // cap single waits
    let mut delay = Duration::from_millis(500);
    let start = Instant::now();

    loop {
        info!("Attempting to connect to Postgres...");

        match PgPoolOptions::new()
            .max_connections(max_connections)
            // Allow extra time to acquire a connection during startup bursts
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(err) => {
                if start.elapsed() >= retry_deadline {
                    warn!(error = %err, "Postgres not ready; retries exhausted");
                    return Err(err);
                }

                warn!(error = %err, "Postgres not ready yet; retrying");
                sleep(delay).await;
                delay = (delay.saturating_mul(2)).min(max_interval);
            }
        }
    }
}

fn migrations_path(config: &DatabaseConfig) -> PathBuf {
    config.migrations_dir.as_ref().map_or_else(
        || Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations")).to_path_buf(),
        PathBuf::from,
    )
}

/// Apply the store and queue migrations.
///
/// # Errors
///
/// Returns an error if the migrations cannot be loaded or applied.
pub async fn run_migrations(pool: &PgPool, dir: &Path) -> Result<(), sqlx::migrate::MigrateError> {
    let migrator = Migrator::new(dir).await?;
    migrator.run(pool).await?;
    info!("Migrations applied");
    Ok(())
}

/// Connect to the database and run migrations
///
/// # Errors
///
/// Returns an error if the database is unreachable or migrations fail.
pub async fn setup_database(config: &DatabaseConfig) -> Result<PgPool, anyhow::Error> {
    let pool = connect_with_retry(&config.connection_url(), config.max_connections).await?;
    run_migrations(&pool, &migrations_path(config)).await?;
    Ok(pool)
}
