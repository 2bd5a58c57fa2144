//! One-time passcodes for phone sign-in.
//!
//! A challenge moves through `NoChallenge -> Issued -> Verified | Expired |
//! Exhausted`. At most one challenge exists per phone number; requesting a new
//! code replaces the old one. Verification consumes the challenge with a
//! compare-and-delete keyed by the challenge id, so two concurrent verifies of
//! the same code succeed at most once. Wrong guesses are counted by the store
//! in the same atomic step, so concurrent guesses cannot share a count.

use std::ops::RangeInclusive;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tapntag_core::{PhoneNumber, PhoneNumberError};

use crate::crypto::constant_time_compare;
use crate::db::{RepositoryError, UserRepository};

/// How long an issued code can be used.
pub const CHALLENGE_VALIDITY: Duration = Duration::from_secs(5 * 60);

/// Bound on handing a code to the sender.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Wrong codes tolerated before the challenge is discarded.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Range codes are drawn from: always four digits.
pub const CODE_RANGE: RangeInclusive<u32> = 1000..=9999;

/// Errors from issuing or checking a passcode.
#[derive(Debug, Error)]
pub enum OtpError {
    /// Phone number is not ten digits.
    #[error("invalid phone number: {0}")]
    InvalidPhoneNumber(#[from] PhoneNumberError),

    /// No code was requested for this number, or it was already used.
    #[error("no OTP found for this phone number")]
    NoChallengeFound,

    /// The code is older than its validity window.
    #[error("OTP has expired")]
    Expired,

    /// Wrong code; the challenge stays usable.
    #[error("invalid OTP")]
    CodeMismatch {
        /// Further wrong guesses allowed before the challenge is discarded.
        attempts_remaining: u32,
    },

    /// Too many wrong codes; a new one must be requested.
    #[error("too many incorrect attempts, request a new OTP")]
    TooManyAttempts,

    /// The code could not be delivered.
    #[error("failed to send OTP: {0}")]
    Delivery(String),

    /// Delivery did not finish in time.
    #[error("sending OTP timed out")]
    DeliveryTimeout,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// An outstanding passcode for one phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    /// Distinguishes this challenge from a later one for the same phone.
    pub id: Uuid,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    /// Whether no account existed for the phone when the code was issued.
    pub is_new_user: bool,
    pub failed_attempts: u32,
}

impl OtpChallenge {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        TimeDelta::from_std(CHALLENGE_VALIDITY)
            .map_or(true, |validity| now.signed_duration_since(self.issued_at) > validity)
    }
}

/// Where outstanding challenges live.
///
/// The conditional operations compare the stored challenge id with the one
/// the caller read, so a challenge replaced in between is left alone.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Store a challenge, replacing any previous one for the phone.
    async fn put(&self, phone: &PhoneNumber, challenge: OtpChallenge);

    /// The current challenge for the phone.
    async fn get(&self, phone: &PhoneNumber) -> Option<OtpChallenge>;

    /// Remove the challenge if it is still `id`. Returns whether it was removed.
    async fn remove_if_current(&self, phone: &PhoneNumber, id: Uuid) -> bool;

    /// Count a wrong guess against the challenge if it is still `id`, removing
    /// it once `limit` guesses have failed.
    ///
    /// Returns the new failure count, or `None` if the challenge was consumed
    /// or replaced.
    async fn record_failure(&self, phone: &PhoneNumber, id: Uuid, limit: u32) -> Option<u32>;
}

/// Process-local challenge store backed by a moka cache.
///
/// Entries are evicted after `retention`, which should be longer than
/// [`CHALLENGE_VALIDITY`] so a late verify still reports `Expired` rather
/// than `NoChallengeFound`.
#[derive(Clone)]
pub struct MokaChallengeStore {
    cache: Cache<PhoneNumber, OtpChallenge>,
}

impl MokaChallengeStore {
    /// Default retention: twice the validity window.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(2 * 5 * 60);

    /// Create a store that forgets challenges after `retention`.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(retention)
                .build(),
        }
    }
}

impl Default for MokaChallengeStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETENTION)
    }
}

#[async_trait]
impl ChallengeStore for MokaChallengeStore {
    async fn put(&self, phone: &PhoneNumber, challenge: OtpChallenge) {
        self.cache.insert(phone.clone(), challenge).await;
    }

    async fn get(&self, phone: &PhoneNumber) -> Option<OtpChallenge> {
        self.cache.get(phone).await
    }

    async fn remove_if_current(&self, phone: &PhoneNumber, id: Uuid) -> bool {
        let result = self
            .cache
            .entry(phone.clone())
            .and_compute_with(|entry| {
                let op = match entry {
                    Some(current) if current.value().id == id => Op::Remove,
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        matches!(result, CompResult::Removed(_))
    }

    async fn record_failure(&self, phone: &PhoneNumber, id: Uuid, limit: u32) -> Option<u32> {
        let result = self
            .cache
            .entry(phone.clone())
            .and_compute_with(move |entry| {
                let op = match entry {
                    Some(current) if current.value().id == id => {
                        let mut challenge = current.into_value();
                        challenge.failed_attempts += 1;
                        if challenge.failed_attempts >= limit {
                            Op::Remove
                        } else {
                            Op::Put(challenge)
                        }
                    }
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        match result {
            CompResult::ReplacedWith(entry) => Some(entry.into_value().failed_attempts),
            CompResult::Removed(_) => Some(limit),
            _ => None,
        }
    }
}

/// Delivers codes to phones.
#[async_trait]
pub trait OtpSender: Send + Sync {
    /// Send `code` to `phone`.
    async fn send(&self, phone: &PhoneNumber, code: &str) -> Result<(), OtpError>;
}

/// Development sender: writes the code to the log instead of sending an SMS.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOtpSender;

#[async_trait]
impl OtpSender for LogOtpSender {
    async fn send(&self, phone: &PhoneNumber, code: &str) -> Result<(), OtpError> {
        info!(phone = %phone.masked(), "OTP issued");
        debug!(phone = %phone, code, "OTP code");
        Ok(())
    }
}

/// A freshly issued challenge.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub phone: PhoneNumber,
    pub is_new_user: bool,
    /// The code, for development echo only.
    pub code: String,
}

/// A phone number that proved possession of its code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPhone {
    pub phone: PhoneNumber,
    pub is_new_user: bool,
}

/// Issues and checks passcodes.
pub struct OtpVerifier<'a> {
    store: &'a dyn ChallengeStore,
    sender: &'a dyn OtpSender,
    users: &'a dyn UserRepository,
    send_timeout: Duration,
}

impl<'a> OtpVerifier<'a> {
    /// Create a new verifier.
    #[must_use]
    pub const fn new(
        store: &'a dyn ChallengeStore,
        sender: &'a dyn OtpSender,
        users: &'a dyn UserRepository,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            users,
            send_timeout,
        }
    }

    /// Issue a new code for `phone` and send it.
    ///
    /// # Errors
    ///
    /// Returns `OtpError::InvalidPhoneNumber` for a malformed number,
    /// `OtpError::Delivery`/`DeliveryTimeout` if sending fails, or
    /// `OtpError::Repository` if the account lookup fails.
    pub async fn request_challenge(&self, phone: &str) -> Result<IssuedChallenge, OtpError> {
        self.request_challenge_at(phone, Utc::now()).await
    }

    /// [`request_challenge`](Self::request_challenge) with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`request_challenge`](Self::request_challenge).
    #[instrument(skip(self, phone))]
    pub async fn request_challenge_at(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedChallenge, OtpError> {
        let phone = PhoneNumber::parse(phone)?;
        let is_new_user = self.users.get_by_phone(&phone).await?.is_none();

        let challenge = OtpChallenge {
            id: Uuid::new_v4(),
            code: generate_code(),
            issued_at: now,
            is_new_user,
            failed_attempts: 0,
        };
        let (id, code) = (challenge.id, challenge.code.clone());
        self.store.put(&phone, challenge).await;

        let delivery = tokio::time::timeout(self.send_timeout, self.sender.send(&phone, &code))
            .await
            .unwrap_or_else(|_| Err(OtpError::DeliveryTimeout));
        if let Err(e) = delivery {
            warn!(phone = %phone.masked(), error = %e, "OTP delivery failed");
            self.store.remove_if_current(&phone, id).await;
            return Err(e);
        }

        Ok(IssuedChallenge {
            phone,
            is_new_user,
            code,
        })
    }

    /// Check `code` against the outstanding challenge for `phone`.
    ///
    /// # Errors
    ///
    /// Returns `OtpError::NoChallengeFound`, `Expired`, `CodeMismatch` or
    /// `TooManyAttempts` as described on [`OtpError`].
    pub async fn verify(&self, phone: &str, code: &str) -> Result<VerifiedPhone, OtpError> {
        self.verify_at(phone, code, Utc::now()).await
    }

    /// [`verify`](Self::verify) with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify).
    #[instrument(skip(self, phone, code))]
    pub async fn verify_at(
        &self,
        phone: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedPhone, OtpError> {
        let phone = PhoneNumber::parse(phone)?;
        let challenge = self
            .store
            .get(&phone)
            .await
            .ok_or(OtpError::NoChallengeFound)?;
        let id = challenge.id;

        if challenge.is_expired(now) {
            self.store.remove_if_current(&phone, id).await;
            return Err(OtpError::Expired);
        }

        if !constant_time_compare(code.trim(), &challenge.code) {
            return match self
                .store
                .record_failure(&phone, id, MAX_FAILED_ATTEMPTS)
                .await
            {
                // Consumed or replaced while we were checking
                None => Err(OtpError::NoChallengeFound),
                Some(failed) if failed >= MAX_FAILED_ATTEMPTS => {
                    warn!(phone = %phone.masked(), "OTP attempts exhausted");
                    Err(OtpError::TooManyAttempts)
                }
                Some(failed) => Err(OtpError::CodeMismatch {
                    attempts_remaining: MAX_FAILED_ATTEMPTS - failed,
                }),
            };
        }

        if !self.store.remove_if_current(&phone, id).await {
            return Err(OtpError::NoChallengeFound);
        }

        debug!(phone = %phone.masked(), "OTP verified");
        Ok(VerifiedPhone {
            phone,
            is_new_user: challenge.is_new_user,
        })
    }
}

fn generate_code() -> String {
    rand::rng().random_range(CODE_RANGE).to_string()
}
