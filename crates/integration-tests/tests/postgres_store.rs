//! Inventory engine against a real `PostgreSQL` database.
//!
//! Requires a migrated, disposable database in `STOREFRONT_TEST_DATABASE_URL`:
//!
//! ```bash
//! STOREFRONT_DATABASE_URL=$STOREFRONT_TEST_DATABASE_URL cargo run -p stockpile-cli -- migrate
//! cargo test -p stockpile-integration-tests --test postgres_store -- --include-ignored
//! ```
//!
//! Tests share the database, so each one seeds its own uniquely named
//! products and uses its own user IDs.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use secrecy::SecretString;
use sqlx::PgPool;
use tokio::task::JoinSet;

use stockpile_core::{ProductId, UserId};
use stockpile_integration_tests::{TEST_DATABASE_URL, patient_policy, price, qty};
use stockpile_storefront::db::{
    self, CatalogSeed, InventoryStore, PgInventoryStore, ProductSeed, catalog,
};
use stockpile_storefront::inventory::{InventoryEngine, InventoryError, OrderItem, OrderRequest};

async fn pool() -> PgPool {
    let url = std::env::var(TEST_DATABASE_URL)
        .unwrap_or_else(|_| panic!("{TEST_DATABASE_URL} must be set for PostgreSQL tests"));
    db::create_pool(&SecretString::from(url), 8).await.unwrap()
}

/// Seed one product with a per-run unique name.
async fn seed_product(pool: &PgPool, label: &str, cents: i64, stock: i32) -> ProductId {
    let name = format!("{label} {}", std::process::id());
    let seed = CatalogSeed {
        products: vec![ProductSeed::new(name, price(cents), stock)],
    };
    catalog::upsert_products(pool, &seed).await.unwrap()[0]
}

fn engine(pool: &PgPool) -> (Arc<PgInventoryStore>, InventoryEngine) {
    let store = Arc::new(PgInventoryStore::new(pool.clone()));
    let engine = InventoryEngine::new(Arc::<PgInventoryStore>::clone(&store), patient_policy());
    (store, engine)
}

/// A user ID unlikely to collide with other tests or earlier runs.
fn user(offset: i32) -> UserId {
    let base = i32::try_from(std::process::id() % 100_000).unwrap() * 1_000;
    UserId::new(base + offset)
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (STOREFRONT_TEST_DATABASE_URL)"]
async fn test_reserve_order_and_release() {
    let pool = pool().await;
    let (store, engine) = engine(&pool);
    let kettle = seed_product(&pool, "Kettle", 2_999, 5).await;
    let (alice, bob) = (user(1), user(2));

    engine.cart().add_item(alice, kettle, qty(5)).await.unwrap();
    let err = engine.cart().add_item(bob, kettle, qty(1)).await.unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InsufficientStock {
            available: 0,
            requested: 1,
            ..
        }
    ));

    let order = engine
        .orders()
        .create_order(
            alice,
            OrderRequest {
                items: vec![OrderItem {
                    product_id: kettle,
                    quantity: qty(3),
                    quoted_price: None,
                }],
                address: "3 Canal Walk".to_string(),
                is_paid: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(order.total_price, price(8_997));

    let reloaded = engine.orders().get_order(alice, order.id).await.unwrap();
    assert_eq!(reloaded.lines, order.lines);
    assert_eq!(reloaded.total_price, order.total_price);
    assert_eq!(reloaded.address, "3 Canal Walk");

    // The remaining two units go back on clear
    assert_eq!(engine.cart().clear_cart(alice).await.unwrap(), 1);
    assert_eq!(store.product(kettle).await.unwrap().unwrap().stock, 2);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (STOREFRONT_TEST_DATABASE_URL)"]
async fn test_racing_adds_never_oversell() {
    let pool = pool().await;
    let (store, engine) = engine(&pool);
    let engine = Arc::new(engine);
    let vinyl = seed_product(&pool, "Signed Vinyl", 5_000, 4).await;

    let mut tasks = JoinSet::new();
    for n in 100..130 {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move { engine.cart().add_item(user(n), vinyl, qty(1)).await });
    }

    let mut reserved = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap().is_ok() {
            reserved += 1;
        }
    }

    assert_eq!(reserved, 4);
    assert_eq!(store.product(vinyl).await.unwrap().unwrap().stock, 0);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (STOREFRONT_TEST_DATABASE_URL)"]
async fn test_upsert_overwrites_by_name() {
    let pool = pool().await;
    let name = format!("Restock Crate {}", std::process::id());

    let first = catalog::upsert_products(
        &pool,
        &CatalogSeed {
            products: vec![ProductSeed::new(name.clone(), price(1_000), 3)],
        },
    )
    .await
    .unwrap();
    let second = catalog::upsert_products(
        &pool,
        &CatalogSeed {
            products: vec![ProductSeed::new(name, price(1_250), 9)],
        },
    )
    .await
    .unwrap();

    assert_eq!(first, second);
    let store = PgInventoryStore::new(pool);
    let product = store.product(first[0]).await.unwrap().unwrap();
    assert_eq!(product.stock, 9);
    assert_eq!(product.price, price(1_250));
    assert!(store.ping().await.is_ok());
}
