//! Seed the catalog from a YAML file.
//!
//! ```yaml
//! products:
//!   - name: Tap'n'Tag Classic Card
//!     description: Matte black NFC card
//!     price: 799
//!     images: [classic-front.webp, classic-back.webp]
//!     features: [NFC, Works with iOS and Android]
//! ```
//!
//! Products whose name is already in the catalog are skipped, so the command
//! can be re-run after editing the file.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use tapntag_storefront::db::{self, PgProductRepository, ProductRepository};
use tapntag_storefront::models::NewProduct;

/// Top level of a catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<NewProduct>,
}

/// Problems found in a catalog file, one message per offending entry.
#[must_use]
pub fn validate_catalog(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, product) in catalog.products.iter().enumerate() {
        let name = product.name.trim();
        if name.is_empty() {
            errors.push(format!("product #{}: name is required", index + 1));
        } else if !seen.insert(name.to_lowercase()) {
            errors.push(format!("product #{}: duplicate name '{name}'", index + 1));
        }
        if product.images.iter().any(|image| image.trim().is_empty()) {
            errors.push(format!("product #{}: empty image reference", index + 1));
        }
    }

    errors
}

/// Insert products from `file_path`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, or if the database
/// cannot be reached.
pub async fn products(file_path: &str, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)?;

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    info!(products = catalog.products.len(), "Catalog validated successfully");
    if dry_run {
        return Ok(());
    }

    let database_url = super::database_url()?;
    let pool = db::create_pool(&database_url, Duration::from_secs(30)).await?;
    let repository = PgProductRepository::new(pool, Duration::from_secs(30));

    let existing: HashSet<String> = repository
        .list()
        .await?
        .into_iter()
        .map(|product| product.name.to_lowercase())
        .collect();

    let mut inserted = 0;
    let mut skipped = 0;
    for product in &catalog.products {
        if existing.contains(&product.name.trim().to_lowercase()) {
            skipped += 1;
            continue;
        }
        let created = repository.create(product).await?;
        info!(id = %created.id, name = %created.name, "Inserted product");
        inserted += 1;
    }

    info!("Seeding complete!");
    info!("  Products inserted: {inserted}");
    info!("  Products skipped (already exist): {skipped}");

    Ok(())
}
