//! Product repository: the read-mostly catalog.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use tapntag_core::{Price, ProductId};

use super::{RepositoryError, timed};
use crate::models::{NewProduct, Product};

/// Catalog storage.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Get a product by ID.
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// All products, oldest first.
    async fn list(&self) -> Result<Vec<Product>, RepositoryError>;

    /// Insert a product.
    async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError>;
}

/// `PostgreSQL` implementation of [`ProductRepository`].
pub struct PgProductRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

/// Decode a `NUMERIC` price column.
pub(crate) fn price_column(row: &PgRow, column: &str) -> Result<Price, RepositoryError> {
    let amount: Decimal = row.try_get(column)?;
    Price::new(amount)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid {column} in database: {e}")))
}

fn product_from_row(row: &PgRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: price_column(row, "price")?,
        images: row.try_get("images")?,
        features: row.try_get("features")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        timed(self.timeout, async {
            let row = sqlx::query(
                r"
                SELECT id, name, description, price, images, features, created_at
                FROM storefront.product
                WHERE id = $1
                ",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(product_from_row).transpose()
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        timed(self.timeout, async {
            let rows = sqlx::query(
                r"
                SELECT id, name, description, price, images, features, created_at
                FROM storefront.product
                ORDER BY id
                ",
            )
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(product_from_row).collect()
        })
        .await
    }

    async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        timed(self.timeout, async {
            let row = sqlx::query(
                r"
                INSERT INTO storefront.product (name, description, price, images, features)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, name, description, price, images, features, created_at
                ",
            )
            .bind(&product.name)
            .bind(product.description.as_deref())
            .bind(product.price.amount())
            .bind(&product.images)
            .bind(&product.features)
            .fetch_one(&self.pool)
            .await?;
            product_from_row(&row)
        })
        .await
    }
}
