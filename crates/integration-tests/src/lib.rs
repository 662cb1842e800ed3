//! Integration test helpers for Stockpile.
//!
//! # Running Tests
//!
//! ```bash
//! # Memory-store and HTTP tests
//! cargo test -p stockpile-integration-tests
//!
//! # Include PostgreSQL tests (migrated, disposable database)
//! STOREFRONT_TEST_DATABASE_URL=postgres://localhost/stockpile_test \
//!     cargo test -p stockpile-integration-tests -- --include-ignored
//! ```
//!
//! # Test Categories
//!
//! - `inventory_flow` - Cart and order scenarios through the engine
//! - `concurrency` - Oversell checks under parallel load
//! - `http_api` - Routes driven in-process with `tower::ServiceExt::oneshot`
//! - `postgres_store` - The same invariants against `PostgreSQL`

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;

use stockpile_core::{Price, ProductId, Quantity, UserId};
use stockpile_storefront::config::StorefrontConfig;
use stockpile_storefront::db::{InventoryStore, MemoryStore, ProductSeed};
use stockpile_storefront::inventory::{InventoryEngine, LockPolicy};
use stockpile_storefront::middleware::USER_ID_HEADER;
use stockpile_storefront::state::AppState;

/// Environment variable naming a disposable, migrated test database.
pub const TEST_DATABASE_URL: &str = "STOREFRONT_TEST_DATABASE_URL";

/// A lock policy generous enough for heavily contended tests.
#[must_use]
pub const fn patient_policy() -> LockPolicy {
    LockPolicy {
        timeout: Duration::from_secs(5),
        retries: 3,
        backoff: Duration::from_millis(10),
    }
}

/// Build a price from whole cents.
#[must_use]
pub fn price(cents: i64) -> Price {
    Price::new(Decimal::new(cents, 2))
}

/// Shorthand for a positive quantity.
#[must_use]
pub fn qty(n: i32) -> Quantity {
    Quantity::new(n).unwrap()
}

/// A memory store plus the engine running on it.
pub struct TestContext {
    pub store: MemoryStore,
    pub engine: InventoryEngine,
}

impl TestContext {
    /// Fresh, empty memory store.
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let engine = InventoryEngine::new(Arc::new(store.clone()), patient_policy());
        Self { store, engine }
    }

    /// Add an active product at `cents` with `stock` units.
    pub fn product(&self, name: &str, cents: i64, stock: i32) -> ProductId {
        self.store
            .add_product(ProductSeed::new(name, price(cents), stock))
            .unwrap()
            .id
    }

    /// Current stock for a product, read through the store.
    pub async fn stock(&self, product_id: ProductId) -> i32 {
        self.store.product(product_id).await.unwrap().unwrap().stock
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Storefront router over `store` with default configuration.
#[must_use]
pub fn test_app(store: &MemoryStore) -> Router {
    let state = AppState::new(StorefrontConfig::in_memory(), Arc::new(store.clone()));
    stockpile_storefront::app(state)
}

/// Build a request, optionally authenticated and with a JSON body.
#[must_use]
pub fn request(method: Method, uri: &str, user: Option<UserId>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user.to_string());
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Collect a response body as JSON.
pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
