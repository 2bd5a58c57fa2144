//! Razorpay Orders API types.
//!
//! See: <https://razorpay.com/docs/api/orders/create/>

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tapntag_core::CurrencyCode;

use super::RazorpayError;

/// Body of `POST /v1/orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOrderRequest {
    /// Amount in minor units (paise for INR).
    pub amount: i64,
    pub currency: CurrencyCode,
    /// Merchant reference for the order.
    pub receipt: String,
}

impl CreateOrderRequest {
    /// Longest receipt Razorpay accepts.
    pub const MAX_RECEIPT_LENGTH: usize = 40;

    /// Build a request, applying Razorpay's field limits.
    ///
    /// # Errors
    ///
    /// Returns `RazorpayError::InvalidRequest` if the amount is not positive or
    /// the receipt is empty or longer than 40 characters.
    pub fn new(
        amount: i64,
        currency: CurrencyCode,
        receipt: impl Into<String>,
    ) -> Result<Self, RazorpayError> {
        let receipt = receipt.into();
        if amount <= 0 {
            return Err(RazorpayError::InvalidRequest(
                "amount must be a positive number of minor units".to_owned(),
            ));
        }
        if receipt.trim().is_empty() {
            return Err(RazorpayError::InvalidRequest("receipt is required".to_owned()));
        }
        if receipt.chars().count() > Self::MAX_RECEIPT_LENGTH {
            return Err(RazorpayError::InvalidRequest(format!(
                "receipt must be at most {} characters",
                Self::MAX_RECEIPT_LENGTH
            )));
        }
        Ok(Self {
            amount,
            currency,
            receipt,
        })
    }
}

/// A Razorpay order as returned by the API.
///
/// Fields the storefront does not read are kept in `extra` so the order can
/// be handed to the browser exactly as Razorpay sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    /// Razorpay order id, e.g. `order_EKwxwAgItmmXdp`.
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    /// `created`, `attempted` or `paid`.
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Error envelope returned with non-2xx responses.
#[derive(Debug, Deserialize)]
pub(super) struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
