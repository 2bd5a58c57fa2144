//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use tapntag_core::{Email, PhoneNumber, UserId};

/// A storefront account.
///
/// Identified by phone number; the email is unique across accounts too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Phone number the account signs in with.
    pub phone_number: PhoneNumber,
    /// Contact email.
    pub email: Email,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// Fields required to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone_number: PhoneNumber,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
}

/// A partial profile update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<Email>,
}

impl ProfileUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }
}

/// Record of a bearer token issued to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// The token's `jti` claim.
    pub jti: Uuid,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
