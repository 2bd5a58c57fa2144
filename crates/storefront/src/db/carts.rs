//! Cart repository.
//!
//! Carts are created lazily: the first add (or clear) for a user inserts the
//! cart row. Adding a product that is already in the cart increments the
//! existing line in a single `INSERT ... ON CONFLICT` statement, so two
//! concurrent adds cannot lose an update.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use tapntag_core::{CartItemId, Price, ProductId, Quantity, UserId};

use super::products::price_column;
use super::{RepositoryError, timed};
use crate::models::{Cart, CartItem, Product};

/// Storage for per-user carts.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// The user's cart with product details, or `None` if never created.
    async fn get(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError>;

    /// Add `quantity` of a product, creating the cart and line as needed.
    ///
    /// A new line records `unit_price`. An existing line keeps its captured
    /// price and has its quantity incremented. Returns
    /// `RepositoryError::Conflict` if the increment would exceed
    /// [`Quantity::MAX`].
    async fn add_or_increment(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
        unit_price: Price,
    ) -> Result<CartItemId, RepositoryError>;

    /// Set a line's quantity. Returns `false` if the line is not in the user's cart.
    async fn set_quantity(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError>;

    /// Remove a line. Returns `false` if the line is not in the user's cart.
    async fn remove_item(&self, user_id: UserId, item_id: CartItemId)
    -> Result<bool, RepositoryError>;

    /// Empty the cart, creating it if missing.
    async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError>;
}

/// `PostgreSQL` implementation of [`CartRepository`].
pub struct PgCartRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgCartRepository {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn cart_item_from_row(row: &PgRow) -> Result<CartItem, RepositoryError> {
    let raw_quantity: i32 = row.try_get("quantity")?;
    let quantity = Quantity::try_from(i64::from(raw_quantity)).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid cart quantity in database: {e}"))
    })?;

    Ok(CartItem {
        id: row.try_get("item_id")?,
        product: Product {
            id: row.try_get("product_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: price_column(row, "price")?,
            images: row.try_get("images")?,
            features: row.try_get("features")?,
            created_at: row.try_get("product_created_at")?,
        },
        quantity,
        unit_price: price_column(row, "unit_price")?,
    })
}

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn get(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        timed(self.timeout, async {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM storefront.cart WHERE user_id = $1)",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
            if !exists {
                return Ok(None);
            }

            let rows = sqlx::query(
                r"
                SELECT ci.id AS item_id, ci.quantity, ci.unit_price,
                       p.id AS product_id, p.name, p.description, p.price,
                       p.images, p.features, p.created_at AS product_created_at
                FROM storefront.cart c
                JOIN storefront.cart_item ci ON ci.cart_id = c.id
                JOIN storefront.product p ON p.id = ci.product_id
                WHERE c.user_id = $1
                ORDER BY ci.id
                ",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

            let items = rows
                .iter()
                .map(cart_item_from_row)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(Cart { user_id, items }))
        })
        .await
    }

    async fn add_or_increment(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
        unit_price: Price,
    ) -> Result<CartItemId, RepositoryError> {
        timed(self.timeout, async {
            // DO UPDATE leaves unit_price alone: the line keeps its first price
            let item_id: Option<CartItemId> = sqlx::query_scalar(
                r"
                WITH cart AS (
                    INSERT INTO storefront.cart (user_id)
                    VALUES ($1)
                    ON CONFLICT (user_id) DO UPDATE SET updated_at = now()
                    RETURNING id
                )
                INSERT INTO storefront.cart_item (cart_id, product_id, quantity, unit_price)
                SELECT id, $2, $3, $4 FROM cart
                ON CONFLICT (cart_id, product_id) DO UPDATE
                    SET quantity = storefront.cart_item.quantity + EXCLUDED.quantity
                    WHERE storefront.cart_item.quantity + EXCLUDED.quantity <= $5
                RETURNING id
                ",
            )
            .bind(user_id)
            .bind(product_id)
            .bind(i32::from(quantity))
            .bind(unit_price.amount())
            .bind(i32::try_from(Quantity::MAX).unwrap_or(i32::MAX))
            .fetch_optional(&self.pool)
            .await?;

            item_id.ok_or_else(|| {
                RepositoryError::Conflict(format!(
                    "cart line for product {product_id} would exceed {} units",
                    Quantity::MAX
                ))
            })
        })
        .await
    }

    async fn set_quantity(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError> {
        timed(self.timeout, async {
            let result = sqlx::query(
                r"
                UPDATE storefront.cart_item ci
                SET quantity = $3
                FROM storefront.cart c
                WHERE ci.cart_id = c.id AND c.user_id = $1 AND ci.id = $2
                ",
            )
            .bind(user_id)
            .bind(item_id)
            .bind(i32::from(quantity))
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn remove_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<bool, RepositoryError> {
        timed(self.timeout, async {
            let result = sqlx::query(
                r"
                DELETE FROM storefront.cart_item ci
                USING storefront.cart c
                WHERE ci.cart_id = c.id AND c.user_id = $1 AND ci.id = $2
                ",
            )
            .bind(user_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        timed(self.timeout, async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r"
                INSERT INTO storefront.cart (user_id)
                VALUES ($1)
                ON CONFLICT (user_id) DO UPDATE SET updated_at = now()
                ",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r"
                DELETE FROM storefront.cart_item ci
                USING storefront.cart c
                WHERE ci.cart_id = c.id AND c.user_id = $1
                ",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }
}
