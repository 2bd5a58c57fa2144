//! Order repository.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use tapntag_core::{OrderId, OrderStatus, Quantity, UserId};

use super::products::price_column;
use super::{RepositoryError, conflict_or_database, timed};
use crate::models::{NewOrder, Order, OrderItem, PaymentReference, ShippingAddress};

/// Storage for placed orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist an order and its lines atomically.
    ///
    /// Returns `RepositoryError::Conflict` if an order already exists for the
    /// same gateway payment id.
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// The user's orders, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;
}

/// `PostgreSQL` implementation of [`OrderRepository`].
pub struct PgOrderRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn order_item_from_row(row: &PgRow) -> Result<OrderItem, RepositoryError> {
    let raw_quantity: i32 = row.try_get("quantity")?;
    let quantity = Quantity::try_from(i64::from(raw_quantity)).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid order quantity in database: {e}"))
    })?;

    Ok(OrderItem {
        product_id: row.try_get("product_id")?,
        product_name: row.try_get("product_name")?,
        quantity,
        unit_price: price_column(row, "unit_price")?,
    })
}

fn order_from_row(row: &PgRow, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
    let Json(shipping_address): Json<ShippingAddress> = row.try_get("shipping_address")?;

    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        items,
        total_amount: price_column(row, "total_amount")?,
        shipping_address,
        payment: PaymentReference {
            gateway_order_id: row.try_get("gateway_order_id")?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
        },
        status: row.try_get::<OrderStatus, _>("status")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        timed(self.timeout, async {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query(
                r"
                INSERT INTO storefront.order
                    (user_id, total_amount, shipping_address,
                     gateway_order_id, gateway_payment_id, status)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, user_id, total_amount, shipping_address,
                          gateway_order_id, gateway_payment_id, status, created_at
                ",
            )
            .bind(order.user_id)
            .bind(order.total_amount.amount())
            .bind(Json(&order.shipping_address))
            .bind(&order.payment.gateway_order_id)
            .bind(&order.payment.gateway_payment_id)
            .bind(order.status)
            .fetch_one(&mut *tx)
            .await
            .map_err(conflict_or_database)?;

            let order_id: OrderId = row.try_get("id")?;

            for (position, item) in (0_i32..).zip(&order.items) {
                sqlx::query(
                    r"
                    INSERT INTO storefront.order_item
                        (order_id, product_id, product_name, quantity, unit_price, position)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ",
                )
                .bind(order_id)
                .bind(item.product_id)
                .bind(&item.product_name)
                .bind(i32::from(item.quantity))
                .bind(item.unit_price.amount())
                .bind(position)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            order_from_row(&row, order.items.clone())
        })
        .await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        timed(self.timeout, async {
            let order_rows = sqlx::query(
                r"
                SELECT id, user_id, total_amount, shipping_address,
                       gateway_order_id, gateway_payment_id, status, created_at
                FROM storefront.order
                WHERE user_id = $1
                ORDER BY created_at DESC, id DESC
                ",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

            if order_rows.is_empty() {
                return Ok(Vec::new());
            }

            let ids = order_rows
                .iter()
                .map(|row| row.try_get::<i32, _>("id"))
                .collect::<Result<Vec<_>, _>>()?;

            let item_rows = sqlx::query(
                r"
                SELECT order_id, product_id, product_name, quantity, unit_price
                FROM storefront.order_item
                WHERE order_id = ANY($1)
                ORDER BY order_id, position
                ",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

            let mut items_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
            for row in &item_rows {
                let order_id: OrderId = row.try_get("order_id")?;
                items_by_order
                    .entry(order_id)
                    .or_default()
                    .push(order_item_from_row(row)?);
            }

            order_rows
                .iter()
                .map(|row| {
                    let id: OrderId = row.try_get("id")?;
                    order_from_row(row, items_by_order.remove(&id).unwrap_or_default())
                })
                .collect()
        })
        .await
    }
}
