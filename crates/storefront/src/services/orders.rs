//! Checkout: payment intents, payment verification and order placement.
//!
//! Placing an order requires a [`PaymentProof`]. The only way to get one is
//! [`OrderService::verify_payment`] succeeding, so an order for an unverified
//! payment cannot be expressed. The gateway order behind the proof is read
//! back before anything is written, and its amount must equal the cart
//! total. Clearing the cart after placement is the caller's job.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use tapntag_core::{CurrencyCode, OrderStatus, Price, PriceError, UserId};

use crate::db::{OrderRepository, RepositoryError};
use crate::models::{Cart, NewOrder, Order, OrderItem, PaymentReference, ShippingAddress};
use crate::razorpay::{CreateOrderRequest, GatewayOrder, PaymentGateway, RazorpayError};

/// How long a verified payment can be turned into an order.
pub const PROOF_TTL: Duration = Duration::from_secs(15 * 60);

/// Errors from checkout operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Request values are malformed.
    #[error("{0}")]
    InvalidInput(String),

    /// Nothing to order.
    #[error("cart is empty")]
    EmptyCart,

    /// Submitted total differs from the cart.
    #[error("total amount {submitted} does not match cart total {expected}")]
    TotalMismatch { expected: Price, submitted: Price },

    /// Shipping address failed validation.
    #[error("{0}")]
    InvalidShippingAddress(String),

    /// The gateway order was opened for a different amount than the cart.
    #[error("payment amount {paid} does not match cart total {expected} in minor units")]
    PaymentAmountMismatch { expected: i64, paid: i64 },

    /// Payment signature did not verify.
    #[error("payment verification failed")]
    SignatureMismatch,

    /// No verified payment for this order/payment pair.
    #[error("payment has not been verified")]
    PaymentNotVerified,

    /// The verification is too old to use.
    #[error("payment verification has expired, verify again")]
    ProofExpired,

    /// This payment already paid for an order.
    #[error("an order already exists for this payment")]
    DuplicateOrder,

    /// Gateway call failed.
    #[error(transparent)]
    Gateway(#[from] RazorpayError),

    /// Totals overflowed.
    #[error("pricing error: {0}")]
    Pricing(#[from] PriceError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Evidence that a gateway payment was verified.
///
/// Fields are private and there is no public constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentProof {
    gateway_order_id: String,
    gateway_payment_id: String,
    verified_at: DateTime<Utc>,
}

impl PaymentProof {
    /// Gateway order the payment was made against.
    #[must_use]
    pub fn gateway_order_id(&self) -> &str {
        &self.gateway_order_id
    }

    /// Gateway payment id.
    #[must_use]
    pub fn gateway_payment_id(&self) -> &str {
        &self.gateway_payment_id
    }

    /// When verification happened.
    #[must_use]
    pub const fn verified_at(&self) -> DateTime<Utc> {
        self.verified_at
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        TimeDelta::from_std(PROOF_TTL)
            .is_ok_and(|ttl| now.signed_duration_since(self.verified_at) <= ttl)
    }
}

/// Cart lines and total frozen for checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    items: Vec<OrderItem>,
    total: Price,
}

impl CartSnapshot {
    /// Copy a cart's lines at their captured prices.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Pricing` if the total overflows.
    pub fn from_cart(cart: &Cart) -> Result<Self, OrderError> {
        let items = cart
            .items
            .iter()
            .map(|line| OrderItem {
                product_id: Some(line.product.id),
                product_name: line.product.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();
        Ok(Self {
            items,
            total: cart.subtotal()?,
        })
    }

    /// Copied lines.
    #[must_use]
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Sum of line totals.
    #[must_use]
    pub const fn total(&self) -> Price {
        self.total
    }
}

/// Checkout service.
pub struct OrderService<'a> {
    orders: &'a dyn OrderRepository,
    gateway: &'a dyn PaymentGateway,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(orders: &'a dyn OrderRepository, gateway: &'a dyn PaymentGateway) -> Self {
        Self { orders, gateway }
    }

    /// Create a payment intent with the gateway.
    ///
    /// Not retried: a retry without a dedup key could create a second intent.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidInput` for values the gateway would reject
    /// and `OrderError::Gateway` if the gateway call fails.
    #[instrument(skip(self, receipt))]
    pub async fn create_payment_intent(
        &self,
        amount_minor_units: i64,
        currency: CurrencyCode,
        receipt: &str,
    ) -> Result<GatewayOrder, OrderError> {
        let request = CreateOrderRequest::new(amount_minor_units, currency, receipt).map_err(
            |e| match e {
                RazorpayError::InvalidRequest(msg) => OrderError::InvalidInput(msg),
                other => OrderError::Gateway(other),
            },
        )?;

        let intent = self.gateway.create_order(&request).await?;
        info!(gateway_order_id = %intent.id, "payment intent created");
        Ok(intent)
    }

    /// Verify a checkout completion report.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::SignatureMismatch` if the signature is wrong and
    /// `OrderError::InvalidInput` if any value is empty.
    pub fn verify_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<PaymentProof, OrderError> {
        self.verify_payment_at(gateway_order_id, gateway_payment_id, signature, Utc::now())
    }

    /// [`verify_payment`](Self::verify_payment) with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`verify_payment`](Self::verify_payment).
    #[instrument(skip(self, signature))]
    pub fn verify_payment_at(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentProof, OrderError> {
        let valid = self
            .gateway
            .verify_payment_signature(gateway_order_id, gateway_payment_id, signature)
            .map_err(|e| match e {
                RazorpayError::MalformedInput(msg) => OrderError::InvalidInput(msg.to_owned()),
                other => OrderError::Gateway(other),
            })?;

        if !valid {
            warn!("payment signature mismatch");
            return Err(OrderError::SignatureMismatch);
        }

        Ok(PaymentProof {
            gateway_order_id: gateway_order_id.to_owned(),
            gateway_payment_id: gateway_payment_id.to_owned(),
            verified_at: now,
        })
    }

    /// Persist an order for a verified payment.
    ///
    /// # Errors
    ///
    /// See [`finalize_at`](Self::finalize_at).
    pub async fn finalize(
        &self,
        user_id: UserId,
        snapshot: &CartSnapshot,
        total_amount: Price,
        shipping_address: ShippingAddress,
        proof: PaymentProof,
    ) -> Result<Order, OrderError> {
        self.finalize_at(
            user_id,
            snapshot,
            total_amount,
            shipping_address,
            proof,
            Utc::now(),
        )
        .await
    }

    /// [`finalize`](Self::finalize) with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::ProofExpired`, `EmptyCart`, `TotalMismatch`,
    /// `InvalidShippingAddress` or `PaymentAmountMismatch` before writing
    /// anything, and `OrderError::DuplicateOrder` if the payment already has
    /// an order.
    #[instrument(skip_all, fields(user_id = %user_id, payment_id = %proof.gateway_payment_id))]
    pub async fn finalize_at(
        &self,
        user_id: UserId,
        snapshot: &CartSnapshot,
        total_amount: Price,
        shipping_address: ShippingAddress,
        proof: PaymentProof,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        if !proof.is_fresh(now) {
            return Err(OrderError::ProofExpired);
        }
        if snapshot.items.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        if total_amount != snapshot.total {
            return Err(OrderError::TotalMismatch {
                expected: snapshot.total,
                submitted: total_amount,
            });
        }
        shipping_address
            .validate()
            .map_err(OrderError::InvalidShippingAddress)?;
        self.check_amount_paid(&proof, snapshot.total).await?;

        let order = self
            .orders
            .create(&NewOrder {
                user_id,
                items: snapshot.items.clone(),
                total_amount,
                shipping_address,
                payment: PaymentReference {
                    gateway_order_id: proof.gateway_order_id,
                    gateway_payment_id: proof.gateway_payment_id,
                },
                status: OrderStatus::Confirmed,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => OrderError::DuplicateOrder,
                other => OrderError::Repository(other),
            })?;

        info!(
            order_id = %order.id,
            status = %order.status,
            total = %order.total_amount,
            "order placed"
        );
        Ok(order)
    }

    /// The gateway order behind `proof` must have been opened for `total`.
    async fn check_amount_paid(
        &self,
        proof: &PaymentProof,
        total: Price,
    ) -> Result<(), OrderError> {
        let intent = self.gateway.fetch_order(&proof.gateway_order_id).await?;
        let currency: CurrencyCode = intent
            .currency
            .parse()
            .map_err(|e: String| OrderError::Gateway(RazorpayError::Response(e)))?;
        let expected = total.to_minor_units(currency)?;

        if intent.amount != expected {
            warn!(
                gateway_order_id = %intent.id,
                paid = intent.amount,
                expected,
                "payment amount does not match cart"
            );
            return Err(OrderError::PaymentAmountMismatch {
                expected,
                paid: intent.amount,
            });
        }
        Ok(())
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_for_user(user_id).await?)
    }
}
