//! Checkout route handlers.
//!
//! # Flow
//!
//! 1. `POST /orders/create` opens a payment intent for the cart total
//! 2. The client pays in Razorpay Checkout
//! 3. `POST /orders/verify` checks the completion signature and remembers the
//!    verified payment for [`PROOF_TTL`](crate::services::orders::PROOF_TTL)
//! 4. `POST /orders` checks that the gateway order was opened for the cart
//!    total, turns the caller's cart into an order and clears the cart
//!
//! Step 4 also accepts the signature inline, for clients that skip step 3.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use tapntag_core::{CurrencyCode, Price};

use super::json_body;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireUser;
use crate::models::{Order, ShippingAddress};
use crate::razorpay::GatewayOrder;
use crate::services::cart::CartService;
use crate::services::orders::{CartSnapshot, OrderError, OrderService, PaymentProof};
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Payment intent request body.
#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    /// Amount in minor units (paise).
    pub amount: i64,
    #[serde(default)]
    pub currency: CurrencyCode,
    pub receipt: String,
}

/// Checkout completion report, field names as Razorpay Checkout sends them.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

/// Order placement request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub total_amount: Price,
    pub shipping_address: ShippingAddress,
    pub payment_id: String,
    pub order_id: String,
    /// Checkout signature, when `/orders/verify` was not called first.
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub order: Order,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub success: bool,
    pub orders: Vec<Order>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Open a payment intent with the gateway.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn create_intent(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    body: std::result::Result<Json<CreateIntentRequest>, JsonRejection>,
) -> Result<Json<GatewayOrder>> {
    let request = json_body(body)?;
    let intent = OrderService::new(state.repositories().orders.as_ref(), state.gateway())
        .create_payment_intent(request.amount, request.currency, &request.receipt)
        .await?;
    Ok(Json(intent))
}

/// Verify a checkout completion and remember it for order placement.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn verify(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    body: std::result::Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<VerifyPaymentResponse>> {
    let request = json_body(body)?;
    let proof = OrderService::new(state.repositories().orders.as_ref(), state.gateway())
        .verify_payment(
            &request.razorpay_order_id,
            &request.razorpay_payment_id,
            &request.razorpay_signature,
        )?;

    state
        .verified_payments()
        .insert(
            (
                identity.user.id,
                request.razorpay_order_id,
                request.razorpay_payment_id,
            ),
            proof,
        )
        .await;

    Ok(Json(VerifyPaymentResponse {
        success: true,
        message: "Payment verified successfully",
    }))
}

/// Place an order from the caller's cart.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn place(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    body: std::result::Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>> {
    let request = json_body(body)?;
    let user_id = identity.user.id;
    let repos = state.repositories();
    let orders = OrderService::new(repos.orders.as_ref(), state.gateway());

    let key = (user_id, request.order_id.clone(), request.payment_id.clone());
    let proof = match state.verified_payments().get(&key).await {
        Some(proof) => proof,
        None => inline_proof(&orders, &request)?,
    };

    let cart_service = CartService::new(repos.carts.as_ref(), repos.products.as_ref());
    let cart = cart_service.get_cart(user_id).await?;
    let snapshot = CartSnapshot::from_cart(&cart)?;

    let order = orders
        .finalize(
            user_id,
            &snapshot,
            request.total_amount,
            request.shipping_address,
            proof,
        )
        .await?;

    state.verified_payments().invalidate(&key).await;
    if let Err(e) = cart_service.clear(user_id).await {
        warn!(order_id = %order.id, error = %e, "order placed but cart not cleared");
    }
    let order_id = order.id.to_string();
    add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order_id.as_str())]));

    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}

/// Verify the signature carried in the placement request, if any.
fn inline_proof(
    orders: &OrderService<'_>,
    request: &PlaceOrderRequest,
) -> std::result::Result<PaymentProof, AppError> {
    let signature = request
        .signature
        .as_deref()
        .ok_or(OrderError::PaymentNotVerified)?;
    Ok(orders.verify_payment(&request.order_id, &request.payment_id, signature)?)
}

/// The caller's orders, newest first.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn my_orders(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
) -> Result<Json<OrderListResponse>> {
    let orders = OrderService::new(state.repositories().orders.as_ref(), state.gateway())
        .list_orders(identity.user.id)
        .await?;
    Ok(Json(OrderListResponse {
        success: true,
        orders,
    }))
}
