//! Checkout completion signatures.
//!
//! Razorpay signs `"{order_id}|{payment_id}"` with HMAC-SHA256 under the key
//! secret and hands the hex digest to the browser. A completion report is
//! genuine only if the server can recompute the same digest.

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use super::RazorpayError;
use crate::crypto::{constant_time_compare, hmac_sha256_hex};

/// The signature Razorpay would produce for this order/payment pair.
///
/// # Errors
///
/// Returns `RazorpayError::MalformedInput` if either id is empty.
pub fn payment_signature(
    order_id: &str,
    payment_id: &str,
    secret: &SecretString,
) -> Result<String, RazorpayError> {
    if order_id.is_empty() {
        return Err(RazorpayError::MalformedInput("order id is empty"));
    }
    if payment_id.is_empty() {
        return Err(RazorpayError::MalformedInput("payment id is empty"));
    }

    hmac_sha256_hex(
        secret.expose_secret().as_bytes(),
        format!("{order_id}|{payment_id}").as_bytes(),
    )
    .map_err(|_| RazorpayError::MalformedInput("key secret is unusable"))
}

/// Check a checkout completion signature.
///
/// Returns `Ok(false)` on mismatch. The comparison runs in constant time.
///
/// # Errors
///
/// Returns `RazorpayError::MalformedInput` if any input is empty.
#[instrument(skip(signature, secret))]
pub fn verify_signature(
    order_id: &str,
    payment_id: &str,
    signature: &str,
    secret: &SecretString,
) -> Result<bool, RazorpayError> {
    if signature.is_empty() {
        return Err(RazorpayError::MalformedInput("signature is empty"));
    }

    let expected = payment_signature(order_id, payment_id, secret)?;
    let matches = constant_time_compare(&expected, signature);
    debug!(matches, "payment signature checked");
    Ok(matches)
}
