//! Cart route handlers.
//!
//! All cart endpoints require a bearer token and answer with the full cart
//! so clients never have to recompute totals.

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tapntag_core::{CartItemId, Price, ProductId, Quantity};

use super::{json_body, path_param};
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::{Cart, CartItem, GuestCart, Product};
use crate::services::cart::CartService;
use crate::services::reconcile::{GuestCartReconciler, ReconcileFailure};
use crate::state::AppState;

/// Cart line as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    #[serde(rename = "_id")]
    pub id: CartItemId,
    pub product: Product,
    pub quantity: Quantity,
    /// Unit price captured when the product was added.
    pub price: Price,
    pub line_total: Price,
}

/// Cart as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: Price,
    pub item_count: u32,
}

// =============================================================================
// Type Conversions
// =============================================================================

impl TryFrom<Cart> for CartView {
    type Error = AppError;

    fn try_from(cart: Cart) -> std::result::Result<Self, Self::Error> {
        let subtotal = cart
            .subtotal()
            .map_err(|e| AppError::Internal(format!("cart total: {e}")))?;
        let item_count = cart.item_count();
        let items = cart
            .items
            .into_iter()
            .map(CartItemView::try_from)
            .collect::<std::result::Result<_, _>>()?;

        Ok(Self {
            items,
            subtotal,
            item_count,
        })
    }
}

impl TryFrom<CartItem> for CartItemView {
    type Error = AppError;

    fn try_from(item: CartItem) -> std::result::Result<Self, Self::Error> {
        let line_total = item
            .line_total()
            .map_err(|e| AppError::Internal(format!("line total: {e}")))?;
        Ok(Self {
            id: item.id,
            product: item.product,
            quantity: item.quantity,
            price: item.unit_price,
            line_total,
        })
    }
}

/// Wrapper adding `success` to a cart.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub success: bool,
    pub cart: CartView,
}

impl CartResponse {
    fn ok(cart: Cart) -> Result<Json<Self>> {
        Ok(Json(Self {
            success: true,
            cart: cart.try_into()?,
        }))
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Add to cart request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

const fn default_quantity() -> i64 {
    1
}

/// Update quantity request body.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// Merge result returned by `/cart/merge`.
#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub success: bool,
    pub cart: CartView,
    pub merged: usize,
    pub failures: Vec<ReconcileFailure>,
}

// =============================================================================
// Handlers
// =============================================================================

/// The caller's cart.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
) -> Result<Json<CartResponse>> {
    let repos = state.repositories();
    let cart = CartService::new(repos.carts.as_ref(), repos.products.as_ref())
        .get_cart(identity.user.id)
        .await?;
    CartResponse::ok(cart)
}

/// Add a product, or increase its quantity.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn add(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    body: std::result::Result<Json<AddToCartRequest>, JsonRejection>,
) -> Result<Json<CartResponse>> {
    let request = json_body(body)?;
    let repos = state.repositories();
    let cart = CartService::new(repos.carts.as_ref(), repos.products.as_ref())
        .add_item(identity.user.id, request.product_id, request.quantity)
        .await?;
    CartResponse::ok(cart)
}

/// Set a line's quantity.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    item_id: std::result::Result<Path<CartItemId>, PathRejection>,
    body: std::result::Result<Json<UpdateQuantityRequest>, JsonRejection>,
) -> Result<Json<CartResponse>> {
    let item_id = path_param(item_id)?;
    let request = json_body(body)?;
    let repos = state.repositories();
    let cart = CartService::new(repos.carts.as_ref(), repos.products.as_ref())
        .update_item_quantity(identity.user.id, item_id, request.quantity)
        .await?;
    CartResponse::ok(cart)
}

/// Remove a line.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    item_id: std::result::Result<Path<CartItemId>, PathRejection>,
) -> Result<Json<CartResponse>> {
    let item_id = path_param(item_id)?;
    let repos = state.repositories();
    let cart = CartService::new(repos.carts.as_ref(), repos.products.as_ref())
        .remove_item(identity.user.id, item_id)
        .await?;
    CartResponse::ok(cart)
}

/// Empty the cart.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn clear(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
) -> Result<Json<CartResponse>> {
    let repos = state.repositories();
    let cart = CartService::new(repos.carts.as_ref(), repos.products.as_ref())
        .clear(identity.user.id)
        .await?;
    CartResponse::ok(cart)
}

/// Merge a guest cart into the caller's cart.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn merge(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    body: std::result::Result<Json<GuestCart>, JsonRejection>,
) -> Result<Json<MergeResponse>> {
    let mut guest = json_body(body)?;
    let repos = state.repositories();
    let report = GuestCartReconciler::new(repos.carts.as_ref(), repos.products.as_ref())
        .reconcile(identity.user.id, &mut guest)
        .await?;

    Ok(Json(MergeResponse {
        success: true,
        cart: report.cart.try_into()?,
        merged: report.merged,
        failures: report.failures,
    }))
}
