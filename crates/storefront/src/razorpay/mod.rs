//! Razorpay payment gateway integration.
//!
//! This module provides:
//! - [`PaymentGateway`], the seam the order flow talks to
//! - [`RazorpayClient`], its implementation over the Razorpay Orders API
//! - [`verify_signature`] for checkout completion callbacks
//!
//! # Flow
//!
//! 1. The server creates a gateway order for the cart total (`create_order`)
//! 2. The browser completes payment in Razorpay Checkout
//! 3. Checkout hands the browser `razorpay_order_id`, `razorpay_payment_id`
//!    and `razorpay_signature`
//! 4. The server recomputes the signature with the key secret and reads the
//!    gateway order back (`fetch_order`) to learn what was actually charged
//!    before any order is recorded

mod client;
mod error;
mod signature;
mod types;

use async_trait::async_trait;

pub use client::RazorpayClient;
pub use error::RazorpayError;
pub use signature::{payment_signature, verify_signature};
pub use types::{CreateOrderRequest, GatewayOrder};

/// Operations the checkout flow needs from a payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a gateway order (payment intent). Never retried.
    async fn create_order(&self, request: &CreateOrderRequest)
    -> Result<GatewayOrder, RazorpayError>;

    /// Read a gateway order back, including the amount it was opened for.
    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, RazorpayError>;

    /// Check a checkout completion signature against this gateway's secret.
    ///
    /// Returns `Ok(false)` on mismatch; errors only for malformed input.
    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, RazorpayError>;
}
