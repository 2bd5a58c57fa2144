//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer token was presented.
    #[error("authentication required")]
    Unauthenticated,

    /// Token is malformed, badly signed, expired or revoked.
    #[error("invalid or expired token")]
    InvalidCredential,

    /// Token is valid but its user no longer exists.
    #[error("user not found")]
    IdentityNotFound,

    /// An account already exists for this phone number.
    #[error("an account already exists for this phone number")]
    AccountExists,

    /// Another account uses this email.
    #[error("email is already in use")]
    EmailTaken,

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] tapntag_core::EmailError),

    /// Profile fields missing or invalid.
    #[error("{0}")]
    InvalidProfile(String),

    /// Registration token is missing, expired or not a registration token.
    #[error("registration token is invalid or expired")]
    InvalidRegistrationToken,

    /// Token could not be signed.
    #[error("token signing failed: {0}")]
    TokenSigning(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
