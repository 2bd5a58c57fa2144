//! Product route handlers (read-only catalog).

use axum::{
    Json,
    extract::{Path, State, rejection::PathRejection},
};
use serde::Serialize;

use tapntag_core::ProductId;

use super::path_param;
use crate::error::{AppError, Result};
use crate::models::Product;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub success: bool,
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub success: bool,
    pub product: Product,
}

/// All products in catalog order.
pub async fn index(State(state): State<AppState>) -> Result<Json<ProductListResponse>> {
    let products = state.repositories().products.list().await?;
    Ok(Json(ProductListResponse {
        success: true,
        products,
    }))
}

/// One product.
pub async fn show(
    State(state): State<AppState>,
    id: std::result::Result<Path<ProductId>, PathRejection>,
) -> Result<Json<ProductResponse>> {
    let id = path_param(id)?;
    let product = state
        .repositories()
        .products
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    Ok(Json(ProductResponse {
        success: true,
        product,
    }))
}
