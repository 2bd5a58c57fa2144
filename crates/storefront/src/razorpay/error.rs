//! Razorpay-related errors.

use thiserror::Error;

/// Errors that can occur when interacting with Razorpay.
#[derive(Debug, Error)]
pub enum RazorpayError {
    /// HTTP request failed before a response arrived.
    #[error("Razorpay request failed: {0}")]
    Request(String),

    /// Razorpay did not answer within the configured timeout.
    #[error("Razorpay request timed out")]
    Timeout,

    /// Razorpay answered with an error.
    #[error("Razorpay API error ({status}): {description}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Razorpay error code, e.g. `BAD_REQUEST_ERROR`.
        code: Option<String>,
        /// Upstream description, passed through unchanged.
        description: String,
    },

    /// Failed to parse response.
    #[error("Razorpay response error: {0}")]
    Response(String),

    /// The request was rejected before being sent.
    #[error("invalid payment request: {0}")]
    InvalidRequest(String),

    /// Signature verification inputs were empty or unusable.
    #[error("malformed payment verification input: {0}")]
    MalformedInput(&'static str),

    /// Client construction failed.
    #[error("Razorpay configuration error: {0}")]
    Config(String),
}
