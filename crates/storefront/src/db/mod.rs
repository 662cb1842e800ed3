//! Persistence for the storefront.
//!
//! # Stores
//!
//! The inventory engine talks to storage only through [`InventoryStore`] and
//! its unit-of-work transaction [`StoreTx`]. Two implementations exist:
//!
//! - [`PgInventoryStore`] - `PostgreSQL` via `sqlx`, row locks with
//!   `SELECT ... FOR UPDATE`
//! - [`MemoryStore`] - process-local, used by tests and `STOREFRONT_STORE=memory`
//!
//! # Database: `stockpile`
//!
//! ## Tables (schema `storefront`)
//!
//! - `product` - Catalog rows with the available-stock counter
//! - `cart_line` - Active and consumed reservations
//! - `customer_order` - Committed orders
//! - `order_line` - Lines of committed orders
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p stockpile-cli -- migrate
//! ```

pub mod catalog;
pub mod memory;
pub mod postgres;
pub mod store;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use catalog::{CatalogSeed, ProductSeed};
pub use memory::MemoryStore;
pub use postgres::PgInventoryStore;
pub use store::{InventoryStore, StoreTx};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., a second active line for the same product).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The in-memory store's state lock was poisoned by a panicking writer.
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
/// * `max_connections` - Upper bound on pooled connections
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &secrecy::SecretString,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2.min(max_connections))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a sqlx error to `Conflict` when it is a unique or check violation.
pub(crate) fn map_constraint_violation(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && (db_err.is_unique_violation() || db_err.is_check_violation())
    {
        return RepositoryError::Conflict(what.to_owned());
    }
    RepositoryError::Database(err)
}
