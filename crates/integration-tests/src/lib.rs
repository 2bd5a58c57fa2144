//! Integration tests for Tap'n'Tag.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory repositories, no services needed
//! cargo test -p tapntag-integration-tests
//!
//! # Postgres-backed tests (ignored by default)
//! STOREFRONT_DATABASE_URL=postgres://... cargo test -p tapntag-integration-tests -- --ignored
//! ```
//!
//! [`TestContext`] drives the real router with `tower::ServiceExt::oneshot`,
//! in-memory repositories, a capturing OTP sender and the real Razorpay
//! client pointed at a wiremock server.

#![allow(clippy::expect_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tapntag_core::{PhoneNumber, Price};
use tapntag_storefront::config::{RazorpayConfig, StorefrontConfig};
use tapntag_storefront::db::{MemoryStore, ProductRepository, Repositories};
use tapntag_storefront::models::{NewProduct, Product};
use tapntag_storefront::razorpay::{RazorpayClient, payment_signature};
use tapntag_storefront::services::otp::{MokaChallengeStore, OtpError, OtpSender};
use tapntag_storefront::state::{AppComponents, AppState};

/// Razorpay key secret used by every test context.
pub const TEST_KEY_SECRET: &str = "rzp_test_secret_Zq8vK2pLm4";

const TEST_JWT_SECRET: &str = "jK9#mP2$vL5@nQ8&rT1*wX4^yZ7!bC3%";

/// OTP sender that records codes instead of delivering them.
#[derive(Default)]
pub struct CapturingSender {
    codes: Mutex<HashMap<String, String>>,
}

impl CapturingSender {
    /// The last code sent to `phone`.
    #[must_use]
    pub fn last_code(&self, phone: &str) -> Option<String> {
        self.codes.lock().ok()?.get(phone).cloned()
    }
}

#[async_trait]
impl OtpSender for CapturingSender {
    async fn send(&self, phone: &PhoneNumber, code: &str) -> Result<(), OtpError> {
        self.codes
            .lock()
            .map_err(|_| OtpError::Delivery("sender poisoned".to_owned()))?
            .insert(phone.to_string(), code.to_owned());
        Ok(())
    }
}

/// A response as seen by a client.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// A storefront app wired to in-memory collaborators.
pub struct TestContext {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub sender: Arc<CapturingSender>,
    pub gateway: MockServer,
}

impl TestContext {
    /// Build a fresh app. Each context has its own store, OTP challenges and
    /// rate limiter.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build a fresh app after adjusting the configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut StorefrontConfig)) -> Self {
        let gateway = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_TEST123",
                "entity": "order",
                "amount": 20_000,
                "amount_paid": 0,
                "currency": "INR",
                "receipt": "rcpt_1",
                "status": "created",
            })))
            .mount(&gateway)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/orders/order_TEST123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_TEST123",
                "entity": "order",
                "amount": 20_000,
                "amount_paid": 20_000,
                "currency": "INR",
                "receipt": "rcpt_1",
                "status": "paid",
            })))
            .mount(&gateway)
            .await;

        let mut config = test_config(&gateway.uri());
        adjust(&mut config);

        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(CapturingSender::default());
        let client = RazorpayClient::new(
            config.razorpay.key_id.clone(),
            config.razorpay.key_secret.clone(),
            config.razorpay.api_base.clone(),
            config.razorpay.timeout,
        )
        .expect("razorpay client");

        let state = AppState::from_components(
            config,
            AppComponents {
                pool: None,
                repositories: Repositories::in_memory(&store),
                challenges: Arc::new(MokaChallengeStore::default()),
                otp_sender: sender.clone(),
                gateway: Arc::new(client),
            },
        );

        Self {
            app: tapntag_storefront::app(state),
            store,
            sender,
            gateway,
        }
    }

    /// Send a request through the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.10");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    /// Request a code for `phone` and return what the sender received.
    pub async fn send_otp(&self, phone: &str) -> String {
        let response = self
            .post("/auth/send-otp", None, json!({ "phoneNumber": phone }))
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        self.sender.last_code(phone).expect("code sent")
    }

    /// Register a new account through the OTP flow and return its token.
    pub async fn sign_up(&self, phone: &str, email: &str) -> String {
        let code = self.send_otp(phone).await;
        let response = self
            .post(
                "/auth/verify-otp",
                None,
                json!({
                    "phoneNumber": phone,
                    "otp": code,
                    "firstName": "Test",
                    "lastName": "Shopper",
                    "email": email,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.body["token"]
            .as_str()
            .expect("token")
            .to_owned()
    }

    /// Insert a catalog product.
    pub async fn add_product(&self, name: &str, price: i64) -> Product {
        ProductRepository::create(
            self.store.as_ref(),
            &NewProduct {
                name: name.to_owned(),
                description: None,
                price: Price::new(Decimal::from(price)).expect("price"),
                images: Vec::new(),
                features: Vec::new(),
            },
        )
        .await
        .expect("product")
    }
}

/// Configuration pointing the gateway at `gateway_uri`.
#[must_use]
pub fn test_config(gateway_uri: &str) -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused"),
        host: "127.0.0.1".parse().expect("ip"),
        port: 0,
        cors_origin: None,
        jwt_secret: SecretString::from(TEST_JWT_SECRET),
        token_ttl_days: 30,
        store_timeout: Duration::from_secs(5),
        otp_echo: false,
        log_json: false,
        razorpay: RazorpayConfig {
            key_id: "rzp_test_key".to_owned(),
            key_secret: SecretString::from(TEST_KEY_SECRET),
            api_base: Url::parse(gateway_uri).expect("mock server url"),
            timeout: Duration::from_secs(2),
        },
        sentry_dsn: None,
        sentry_environment: "test".to_owned(),
        sentry_traces_sample_rate: 0.0,
    }
}

/// The checkout signature Razorpay would hand the browser.
#[must_use]
pub fn checkout_signature(order_id: &str, payment_id: &str) -> String {
    payment_signature(order_id, payment_id, &SecretString::from(TEST_KEY_SECRET))
        .expect("signature")
}
