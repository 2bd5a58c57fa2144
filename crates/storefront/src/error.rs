//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Every error body is `{"success": false, "message": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::razorpay::RazorpayError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::orders::OrderError;
use crate::services::otp::OtpError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// OTP issue/verify failed.
    #[error("OTP error: {0}")]
    Otp(#[from] OtpError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and client-safe message.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Database(err) => repository_response(err),
            Self::Auth(err) => auth_response(err),
            Self::Otp(err) => otp_response(err),
            Self::Cart(err) => cart_response(err),
            Self::Order(err) => order_response(err),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, please try again later".to_string(),
            ),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

fn repository_response(err: &RepositoryError) -> (StatusCode, String) {
    match err {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
        RepositoryError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        RepositoryError::Timeout => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable".to_string(),
        ),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
        }
    }
}

fn auth_response(err: &AuthError) -> (StatusCode, String) {
    match err {
        AuthError::Unauthenticated => (
            StatusCode::UNAUTHORIZED,
            "No token, authorization denied".to_string(),
        ),
        AuthError::InvalidCredential | AuthError::InvalidRegistrationToken => {
            (StatusCode::UNAUTHORIZED, err.to_string())
        }
        AuthError::IdentityNotFound => (StatusCode::NOT_FOUND, "User not found".to_string()),
        AuthError::AccountExists | AuthError::EmailTaken => (StatusCode::CONFLICT, err.to_string()),
        AuthError::InvalidEmail(_) => (StatusCode::BAD_REQUEST, "Invalid email address".to_string()),
        AuthError::InvalidProfile(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        AuthError::TokenSigning(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
        }
        AuthError::Repository(err) => repository_response(err),
    }
}

fn otp_response(err: &OtpError) -> (StatusCode, String) {
    match err {
        OtpError::InvalidPhoneNumber(_)
        | OtpError::NoChallengeFound
        | OtpError::Expired
        | OtpError::CodeMismatch { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        OtpError::TooManyAttempts => (StatusCode::TOO_MANY_REQUESTS, err.to_string()),
        OtpError::Delivery(_) => (StatusCode::BAD_GATEWAY, "Failed to send OTP".to_string()),
        OtpError::DeliveryTimeout => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
        OtpError::Repository(err) => repository_response(err),
    }
}

fn cart_response(err: &CartError) -> (StatusCode, String) {
    match err {
        CartError::InvalidQuantity(_) | CartError::QuantityLimitExceeded { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        CartError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "Product not found".to_string()),
        CartError::CartNotFound => (StatusCode::NOT_FOUND, "Cart not found".to_string()),
        CartError::ItemNotFound(_) => (StatusCode::NOT_FOUND, "Item not found in cart".to_string()),
        CartError::Pricing(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string()),
        CartError::Repository(err) => repository_response(err),
    }
}

fn order_response(err: &OrderError) -> (StatusCode, String) {
    match err {
        OrderError::InvalidInput(msg) | OrderError::InvalidShippingAddress(msg) => {
            (StatusCode::BAD_REQUEST, msg.clone())
        }
        OrderError::EmptyCart
        | OrderError::TotalMismatch { .. }
        | OrderError::PaymentAmountMismatch { .. }
        | OrderError::SignatureMismatch
        | OrderError::PaymentNotVerified
        | OrderError::ProofExpired => (StatusCode::BAD_REQUEST, err.to_string()),
        OrderError::DuplicateOrder => (StatusCode::CONFLICT, err.to_string()),
        OrderError::Gateway(err) => gateway_response(err),
        OrderError::Pricing(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string()),
        OrderError::Repository(err) => repository_response(err),
    }
}

fn gateway_response(err: &RazorpayError) -> (StatusCode, String) {
    match err {
        RazorpayError::Timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            "Payment gateway timed out".to_string(),
        ),
        RazorpayError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        RazorpayError::MalformedInput(msg) => (StatusCode::BAD_REQUEST, (*msg).to_string()),
        RazorpayError::Api { description, .. } => (StatusCode::BAD_GATEWAY, description.clone()),
        RazorpayError::Request(_) | RazorpayError::Response(_) => (
            StatusCode::BAD_GATEWAY,
            "Payment gateway error".to_string(),
        ),
        RazorpayError::Config(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
