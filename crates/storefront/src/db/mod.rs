//! Database operations for the storefront `PostgreSQL` store.
//!
//! # Tables (schema `storefront`)
//!
//! - `user` - Accounts keyed by phone number
//! - `user_token` - Issued bearer tokens, by `jti`
//! - `product` - Catalog
//! - `cart` / `cart_item` - One cart per user, one line per product
//! - `order` / `order_item` - Placed orders with copied lines
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p tapntag-cli -- migrate
//! ```
//!
//! Each table is reached through a repository trait. The `Pg*` types talk to
//! `PostgreSQL`; [`memory::MemoryStore`] implements every trait in process for
//! tests and local experiments.

pub mod carts;
pub mod memory;
pub mod orders;
pub mod products;
pub mod users;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use carts::{CartRepository, PgCartRepository};
pub use memory::MemoryStore;
pub use orders::{OrderRepository, PgOrderRepository};
pub use products::{PgProductRepository, ProductRepository};
pub use users::{PgUserRepository, UserRepository};

/// Errors that can occur during repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database query or connection error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is invalid or corrupted.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Unique or check constraint violation.
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The store did not answer within the configured bound.
    #[error("store operation timed out")]
    Timeout,
}

/// Create a `PostgreSQL` connection pool.
///
/// `acquire_timeout` bounds how long a request waits for a free connection;
/// it is the same bound applied to each repository call.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &secrecy::SecretString,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(acquire_timeout)
        .connect(database_url.expose_secret())
        .await
}

/// Run a store operation with an upper bound on its duration.
///
/// A pool that cannot hand out a connection in time is reported the same way
/// as a query that ran too long.
///
/// # Errors
///
/// Returns `RepositoryError::Timeout` if `limit` elapses first, otherwise the
/// operation's own result.
pub async fn timed<T, F>(limit: Duration, operation: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))) | Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis(), "store operation timed out");
            Err(RepositoryError::Timeout)
        }
        Ok(result) => result,
    }
}

/// Map a unique-constraint violation to `Conflict`, naming the clashing field.
pub(crate) fn conflict_or_database(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        let message = match db_err.constraint() {
            Some("user_email_key") => "email already exists",
            Some("user_phone_number_key") => "phone number already exists",
            Some("order_gateway_payment_id_key") => "payment already used for an order",
            _ => "record already exists",
        };
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(e)
}

/// All repositories the storefront needs, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub orders: Arc<dyn OrderRepository>,
}

impl Repositories {
    /// Repositories backed by `PostgreSQL`, each call bounded by `timeout`.
    #[must_use]
    pub fn postgres(pool: &PgPool, timeout: Duration) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone(), timeout)),
            products: Arc::new(PgProductRepository::new(pool.clone(), timeout)),
            carts: Arc::new(PgCartRepository::new(pool.clone(), timeout)),
            orders: Arc::new(PgOrderRepository::new(pool.clone(), timeout)),
        }
    }

    /// Repositories sharing one in-memory store.
    #[must_use]
    pub fn in_memory(store: &Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            products: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
        }
    }
}
