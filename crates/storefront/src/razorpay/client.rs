//! Razorpay Orders API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, instrument};
use url::Url;

use super::error::RazorpayError;
use super::types::{CreateOrderRequest, ErrorResponse, GatewayOrder};
use super::{PaymentGateway, verify_signature};

/// Razorpay API client.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    /// Public key id, sent as the basic-auth username.
    key_id: String,
    /// Key secret: basic-auth password and signature key.
    key_secret: SecretString,
    /// API root, `https://api.razorpay.com` in production.
    api_base: Url,
}

impl std::fmt::Debug for RazorpayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayClient")
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl RazorpayClient {
    /// Create a new Razorpay client whose requests give up after `timeout`.
    ///
    /// A base URL with a path is treated as a directory, so
    /// `https://proxy.example/razorpay` serves `/razorpay/v1/orders`.
    ///
    /// # Errors
    ///
    /// Returns `RazorpayError::Config` if the HTTP client cannot be built.
    pub fn new(
        key_id: String,
        key_secret: SecretString,
        mut api_base: Url,
        timeout: Duration,
    ) -> Result<Self, RazorpayError> {
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RazorpayError::Config(e.to_string()))?;

        Ok(Self {
            client,
            key_id,
            key_secret,
            api_base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RazorpayError> {
        self.api_base
            .join(path)
            .map_err(|e| RazorpayError::Config(format!("invalid API base URL: {e}")))
    }

    /// Send an authenticated request and decode a successful body.
    async fn send(
        &self,
        request: RequestBuilder,
        action: &str,
    ) -> Result<GatewayOrder, RazorpayError> {
        let response = request
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RazorpayError::Timeout
                } else {
                    RazorpayError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (code, description) = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(parsed) => (
                    parsed.error.code,
                    parsed
                        .error
                        .description
                        .unwrap_or_else(|| "Unknown error".to_owned()),
                ),
                Err(_) => (None, body),
            };
            error!(status = status.as_u16(), ?code, %description, "Razorpay API error {action}");
            return Err(RazorpayError::Api {
                status: status.as_u16(),
                code,
                description,
            });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                RazorpayError::Timeout
            } else {
                RazorpayError::Response(e.to_string())
            }
        })
    }
}

/// Razorpay ids are `<prefix>_<alphanumerics>`.
fn is_valid_order_id(order_id: &str) -> bool {
    !order_id.is_empty()
        && order_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip(self, request), fields(amount = request.amount, currency = %request.currency))]
    async fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<GatewayOrder, RazorpayError> {
        let order = self
            .send(
                self.client.post(self.endpoint("v1/orders")?).json(request),
                "creating order",
            )
            .await?;

        debug!(order_id = %order.id, status = %order.status, "Razorpay order created");

        Ok(order)
    }

    #[instrument(skip(self))]
    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, RazorpayError> {
        if !is_valid_order_id(order_id) {
            return Err(RazorpayError::MalformedInput(
                "razorpay_order_id is not a valid order id",
            ));
        }

        let order = self
            .send(
                self.client.get(self.endpoint(&format!("v1/orders/{order_id}"))?),
                "fetching order",
            )
            .await?;

        debug!(
            order_id = %order.id,
            amount = order.amount,
            status = %order.status,
            "Razorpay order fetched"
        );

        Ok(order)
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, RazorpayError> {
        verify_signature(order_id, payment_id, signature, &self.key_secret)
    }
}
