//! Seed the product catalog from a YAML file.
//!
//! ```yaml
//! products:
//!   - name: Field Notebook
//!     price: "12.50"
//!     stock: 40
//!   - name: Brass Pen
//!     price: "34.00"
//!     stock: 5
//!     is_active: false
//! ```
//!
//! Products are matched by name. Existing rows get their price, stock and
//! active flag overwritten, so re-running a seed resets stock levels.

use std::path::Path;

use tracing::info;

use stockpile_storefront::db::{self, CatalogSeed, catalog};

use super::migrate;

/// Seed products from a YAML file.
///
/// # Arguments
///
/// * `file_path` - Path to the catalog YAML file
/// * `dry_run` - Validate the file without connecting to the database
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation, the
/// database URL is missing, or the upsert fails.
pub async fn products(file_path: &str, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    // Verify file exists
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let seed = CatalogSeed::from_yaml(&content)?;

    info!(products = seed.products.len(), "Catalog validated successfully");

    if dry_run {
        info!("Dry run, nothing written");
        return Ok(());
    }

    let database_url = migrate::database_url()?;
    let pool = db::create_pool(&database_url, 2).await?;
    info!("Connected to database");

    let ids = catalog::upsert_products(&pool, &seed).await?;

    info!("Seeding complete!");
    info!("  Products upserted: {}", ids.len());

    Ok(())
}
