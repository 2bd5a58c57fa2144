//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                  - Liveness
//! GET    /health/ready            - Database readiness
//!
//! # Auth (send-otp and verify-otp are rate limited)
//! POST   /auth/send-otp           - Issue a sign-in code
//! POST   /auth/verify-otp         - Check a code, sign in or start registration
//! POST   /auth/create-account     - Finish registration with a registration token
//! GET    /auth/profile            - Caller's profile (bearer)
//! PATCH  /auth/profile            - Update name/email (bearer)
//! POST   /auth/logout             - Revoke the presented token (bearer)
//!
//! # Products
//! GET    /products                - Catalog
//! GET    /products/{id}           - Product detail
//!
//! # Cart (bearer)
//! GET    /cart                    - Cart with totals
//! POST   /cart/add                - Add or increment a product
//! PUT    /cart/update/{itemId}    - Set a line's quantity
//! DELETE /cart/remove/{itemId}    - Remove a line
//! DELETE /cart/clear              - Empty the cart
//! POST   /cart/merge              - Merge a guest cart
//!
//! # Orders (bearer)
//! POST   /orders/create           - Open a payment intent
//! POST   /orders/verify           - Verify a checkout completion
//! POST   /orders                  - Place an order from the cart
//! GET    /orders/my-orders        - Caller's orders, newest first
//! ```

pub mod auth;
pub mod cart;
pub mod health;
pub mod orders;
pub mod products;

use axum::{
    Json, Router,
    extract::{
        Path,
        rejection::{JsonRejection, PathRejection},
    },
    routing::{delete, get, post, put},
};

use crate::error::AppError;
use crate::middleware::otp_rate_limiter;
use crate::state::AppState;

/// Unwrap a JSON body, turning extractor rejections into JSON 400s.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Unwrap a path parameter, turning extractor rejections into JSON 400s.
pub(crate) fn path_param<T>(param: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    param
        .map(|Path(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Create the health routes router.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    let otp = Router::new()
        .route("/send-otp", post(auth::send_otp))
        .route("/verify-otp", post(auth::verify_otp))
        .layer(otp_rate_limiter());

    Router::new()
        .merge(otp)
        .route("/create-account", post(auth::create_account))
        .route(
            "/profile",
            get(auth::get_profile).patch(auth::update_profile),
        )
        .route("/logout", post(auth::logout))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update/{item_id}", put(cart::update))
        .route("/remove/{item_id}", delete(cart::remove))
        .route("/clear", delete(cart::clear))
        .route("/merge", post(cart::merge))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(orders::place))
        .route("/create", post(orders::create_intent))
        .route("/verify", post(orders::verify))
        .route("/my-orders", get(orders::my_orders))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/health", health_routes())
        .nest("/auth", auth_routes())
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
}
