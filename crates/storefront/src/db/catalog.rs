//! Catalog seeding.
//!
//! The catalog itself is managed outside this service; these types load a
//! YAML description of products so a database (or the in-memory store) can be
//! populated for development and tests.
//!
//! ```yaml
//! products:
//!   - name: Sunscreen SPF 50
//!     price: "19.99"
//!     stock: 40
//!   - name: Retired Lotion
//!     price: "9.50"
//!     stock: 0
//!     is_active: false
//! ```

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use stockpile_core::{CategoryId, Price, ProductId};

use super::RepositoryError;

/// Errors that can occur when loading a catalog seed.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid catalog YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("product #{index}: {reason}")]
    Invalid { index: usize, reason: &'static str },
}

/// A set of products to load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    pub products: Vec<ProductSeed>,
}

/// One product to load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSeed {
    pub name: String,
    /// Decimal string in YAML (`"19.99"`).
    pub price: Price,
    pub stock: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

const fn default_active() -> bool {
    true
}

impl ProductSeed {
    /// An active, uncategorized product.
    #[must_use]
    pub fn new(name: impl Into<String>, price: Price, stock: i32) -> Self {
        Self {
            name: name.into(),
            price,
            stock,
            is_active: true,
            category_id: None,
        }
    }

    fn check(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("name is required");
        }
        if self.price.is_negative() {
            return Err("price must not be negative");
        }
        if self.stock < 0 {
            return Err("stock must not be negative");
        }
        Ok(())
    }
}

impl CatalogSeed {
    /// Parse and validate a YAML catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Parse` for malformed YAML and
    /// `CatalogError::Invalid` for a product with a blank name, negative
    /// price or negative stock.
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let seed: Self = serde_yaml::from_str(yaml)?;
        seed.validate()?;
        Ok(seed)
    }

    /// Validate every product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` naming the first bad product.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for (index, product) in self.products.iter().enumerate() {
            product
                .check()
                .map_err(|reason| CatalogError::Invalid { index, reason })?;
        }
        Ok(())
    }
}

/// Insert or update seed products by name, in one transaction.
///
/// Existing products keep their ID; price, stock and flags are overwritten.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if any statement fails; nothing is
/// written in that case.
#[instrument(skip(pool, seed), fields(products = seed.products.len()))]
pub async fn upsert_products(
    pool: &PgPool,
    seed: &CatalogSeed,
) -> Result<Vec<ProductId>, RepositoryError> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(seed.products.len());

    for product in &seed.products {
        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO storefront.product (name, price, stock_quantity, is_active, category_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE
            SET price = EXCLUDED.price,
                stock_quantity = EXCLUDED.stock_quantity,
                is_active = EXCLUDED.is_active,
                category_id = EXCLUDED.category_id,
                updated_at = now()
            RETURNING id
            ",
        )
        .bind(&product.name)
        .bind(product.price.amount())
        .bind(product.stock)
        .bind(product.is_active)
        .bind(product.category_id)
        .fetch_one(&mut *tx)
        .await?;
        ids.push(ProductId::new(id));
    }

    tx.commit().await?;
    Ok(ids)
}
