//! Authentication service.
//!
//! Resolves bearer tokens to users (the gate in front of every cart, order
//! and profile operation), creates accounts for phone numbers that passed OTP
//! verification, and manages profiles and sign-out.

mod error;
pub mod token;

pub use error::AuthError;
pub use token::{SessionClaims, TokenError, TokenIssuer};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use tapntag_core::{Email, PhoneNumber};

use crate::db::{RepositoryError, UserRepository};
use crate::models::{NewUser, ProfileUpdate, User};

/// Longest first or last name accepted.
const MAX_NAME_LENGTH: usize = 100;

/// A user resolved from a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: User,
    /// `jti` of the presented token.
    pub token_id: Uuid,
}

/// Details a new account needs beyond its phone number.
#[derive(Debug, Clone, Default)]
pub struct AccountDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Requested profile changes, as submitted.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: &'a dyn UserRepository,
    tokens: &'a TokenIssuer,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(users: &'a dyn UserRepository, tokens: &'a TokenIssuer) -> Self {
        Self { users, tokens }
    }

    // =========================================================================
    // Identity resolution
    // =========================================================================

    /// Resolve a bearer token to its user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` if no token was given,
    /// `AuthError::InvalidCredential` if it does not verify or was revoked, and
    /// `AuthError::IdentityNotFound` if its user is gone.
    pub async fn resolve(&self, bearer: Option<&str>) -> Result<Identity, AuthError> {
        self.resolve_at(bearer, Utc::now()).await
    }

    /// [`resolve`](Self::resolve) with an explicit clock for the revocation check.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    #[instrument(skip_all)]
    pub async fn resolve_at(
        &self,
        bearer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Identity, AuthError> {
        let token = bearer
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthenticated)?;

        let claims = self.tokens.verify_session(token).map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            AuthError::InvalidCredential
        })?;

        let user = self
            .users
            .get_by_id(claims.user_id)
            .await?
            .ok_or(AuthError::IdentityNotFound)?;

        if !self
            .users
            .is_token_active(claims.user_id, claims.jti, now)
            .await?
        {
            return Err(AuthError::InvalidCredential);
        }

        Ok(Identity {
            user,
            token_id: claims.jti,
        })
    }

    // =========================================================================
    // Sign-in and accounts
    // =========================================================================

    /// Issue and record a session token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenSigning` or `AuthError::Repository`.
    pub async fn sign_in(&self, user: &User) -> Result<String, AuthError> {
        let (token, record) = self
            .tokens
            .issue_session(user.id, Utc::now())
            .map_err(|e| AuthError::TokenSigning(e.to_string()))?;
        self.users.record_token(&record).await?;
        info!(user_id = %user.id, "session issued");
        Ok(token)
    }

    /// The account registered to `phone`, if any.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the lookup fails.
    pub async fn account_for_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, AuthError> {
        Ok(self.users.get_by_phone(phone).await?)
    }

    /// A short-lived token proving `phone` passed OTP verification.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenSigning` if signing fails.
    pub fn registration_token(&self, phone: &PhoneNumber) -> Result<String, AuthError> {
        self.tokens
            .issue_registration(phone, Utc::now())
            .map_err(|e| AuthError::TokenSigning(e.to_string()))
    }

    /// The phone number a registration token was issued for.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRegistrationToken` if the token does not verify.
    pub fn registered_phone(&self, token: &str) -> Result<PhoneNumber, AuthError> {
        self.tokens.verify_registration(token).map_err(|e| {
            debug!(error = %e, "rejected registration token");
            AuthError::InvalidRegistrationToken
        })
    }

    /// Create an account for a verified phone number.
    ///
    /// The account starts with an empty cart.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidProfile`/`InvalidEmail` for bad details,
    /// `AuthError::AccountExists` if the phone is registered, and
    /// `AuthError::EmailTaken` if the email is in use.
    #[instrument(skip(self, details), fields(phone = %phone.masked()))]
    pub async fn create_account(
        &self,
        phone: PhoneNumber,
        details: AccountDetails,
    ) -> Result<User, AuthError> {
        let first_name = clean_name("firstName", &details.first_name)?;
        let last_name = clean_name("lastName", &details.last_name)?;
        let email = Email::parse(&details.email)?;

        if self.users.get_by_phone(&phone).await?.is_some() {
            return Err(AuthError::AccountExists);
        }
        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let user = self
            .users
            .create(&NewUser {
                phone_number: phone,
                email,
                first_name,
                last_name,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(msg) if msg.contains("email") => AuthError::EmailTaken,
                RepositoryError::Conflict(_) => AuthError::AccountExists,
                other => AuthError::Repository(other),
            })?;

        info!(user_id = %user.id, "account created");
        Ok(user)
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Update name and email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidProfile`/`InvalidEmail` for bad values and
    /// `AuthError::EmailTaken` if another account has the new email.
    pub async fn update_profile(
        &self,
        user: &User,
        changes: ProfileChanges,
    ) -> Result<User, AuthError> {
        let mut update = ProfileUpdate {
            first_name: changes
                .first_name
                .map(|name| clean_name("firstName", &name))
                .transpose()?,
            last_name: changes
                .last_name
                .map(|name| clean_name("lastName", &name))
                .transpose()?,
            email: changes.email.as_deref().map(Email::parse).transpose()?,
        };

        if update.email.as_ref() == Some(&user.email) {
            update.email = None;
        }
        if let Some(email) = &update.email
            && self.users.get_by_email(email).await?.is_some()
        {
            return Err(AuthError::EmailTaken);
        }
        if update.is_empty() {
            return Ok(user.clone());
        }

        self.users
            .update_profile(user.id, &update)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::EmailTaken,
                RepositoryError::NotFound => AuthError::IdentityNotFound,
                other => AuthError::Repository(other),
            })
    }

    /// Revoke the token the identity was resolved from.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the revocation cannot be stored.
    pub async fn logout(&self, identity: &Identity) -> Result<(), AuthError> {
        self.users
            .revoke_token(identity.user.id, identity.token_id)
            .await?;
        info!(user_id = %identity.user.id, "session revoked");
        Ok(())
    }
}

fn clean_name(field: &str, value: &str) -> Result<String, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthError::InvalidProfile(format!("{field} is required")));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidProfile(format!(
            "{field} must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_owned())
}
