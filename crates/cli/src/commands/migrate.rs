//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! tnt-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_MIGRATIONS_DIR` - Migration directory (default: `crates/storefront/migrations`)

use std::path::Path;
use std::time::Duration;

use sqlx::migrate::{MigrateError, Migrator};
use thiserror::Error;
use tracing::info;

use tapntag_storefront::db;

const DEFAULT_MIGRATIONS_DIR: &str = "crates/storefront/migrations";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrateError),
}

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn storefront() -> Result<(), MigrationError> {
    let database_url = super::database_url().map_err(|_| {
        MigrationError::MissingEnvVar("STOREFRONT_DATABASE_URL")
    })?;
    let dir = std::env::var("STOREFRONT_MIGRATIONS_DIR")
        .unwrap_or_else(|_| DEFAULT_MIGRATIONS_DIR.to_string());

    info!("Connecting to storefront database...");
    let pool = db::create_pool(&database_url, Duration::from_secs(30)).await?;

    let migrator = Migrator::new(Path::new(&dir)).await?;
    info!(dir = %dir, migrations = migrator.iter().count(), "Running storefront migrations...");
    migrator.run(&pool).await?;

    info!("Storefront migrations complete!");
    Ok(())
}
