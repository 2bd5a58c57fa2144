//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use moka::future::Cache;
use sqlx::PgPool;

use tapntag_core::UserId;

use crate::config::StorefrontConfig;
use crate::db::Repositories;
use crate::razorpay::{PaymentGateway, RazorpayClient, RazorpayError};
use crate::services::auth::TokenIssuer;
use crate::services::orders::{PROOF_TTL, PaymentProof};
use crate::services::otp::{ChallengeStore, LogOtpSender, MokaChallengeStore, OtpSender};

/// Verified payments awaiting order placement, keyed by
/// (user, gateway order id, gateway payment id).
pub type VerifiedPayments = Cache<(UserId, String, String), PaymentProof>;

/// Collaborators the state is assembled from.
///
/// Production wiring is [`AppState::new`]; tests supply their own.
pub struct AppComponents {
    pub pool: Option<PgPool>,
    pub repositories: Repositories,
    pub challenges: Arc<dyn ChallengeStore>,
    pub otp_sender: Arc<dyn OtpSender>,
    pub gateway: Arc<dyn PaymentGateway>,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like repositories, the gateway and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    repositories: Repositories,
    challenges: Arc<dyn ChallengeStore>,
    otp_sender: Arc<dyn OtpSender>,
    gateway: Arc<dyn PaymentGateway>,
    tokens: TokenIssuer,
    verified_payments: VerifiedPayments,
}

impl AppState {
    /// Create the production state: Postgres repositories, the Razorpay
    /// client, in-process OTP challenges and log-only OTP delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the Razorpay HTTP client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, RazorpayError> {
        let gateway = RazorpayClient::new(
            config.razorpay.key_id.clone(),
            config.razorpay.key_secret.clone(),
            config.razorpay.api_base.clone(),
            config.razorpay.timeout,
        )?;
        let repositories = Repositories::postgres(&pool, config.store_timeout);

        Ok(Self::from_components(
            config,
            AppComponents {
                pool: Some(pool),
                repositories,
                challenges: Arc::new(MokaChallengeStore::default()),
                otp_sender: Arc::new(LogOtpSender),
                gateway: Arc::new(gateway),
            },
        ))
    }

    /// Create a state from explicit collaborators.
    #[must_use]
    pub fn from_components(config: StorefrontConfig, components: AppComponents) -> Self {
        let tokens = TokenIssuer::new(&config.jwt_secret, TimeDelta::days(config.token_ttl_days));
        let verified_payments = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(PROOF_TTL)
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool: components.pool,
                repositories: components.repositories,
                challenges: components.challenges,
                otp_sender: components.otp_sender,
                gateway: components.gateway,
                tokens,
                verified_payments,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The database pool, absent when running on in-memory repositories.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn repositories(&self) -> &Repositories {
        &self.inner.repositories
    }

    #[must_use]
    pub fn challenges(&self) -> &dyn ChallengeStore {
        self.inner.challenges.as_ref()
    }

    #[must_use]
    pub fn otp_sender(&self) -> &dyn OtpSender {
        self.inner.otp_sender.as_ref()
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.inner.gateway.as_ref()
    }

    /// Session and registration token issuer.
    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.inner.tokens
    }

    #[must_use]
    pub fn verified_payments(&self) -> &VerifiedPayments {
        &self.inner.verified_payments
    }

    /// Bound on a single readiness probe.
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.inner.config.store_timeout
    }
}
