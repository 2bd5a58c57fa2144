//! Signed bearer tokens.
//!
//! Two kinds of HS256 JWT are issued:
//!
//! - **session**: `sub` is the user id, valid for the configured TTL (30 days
//!   by default). Its `jti` is recorded so the token can be revoked.
//! - **registration**: `sub` is a phone number that just passed OTP
//!   verification but has no account yet. Valid for 15 minutes and only
//!   accepted by account creation.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use tapntag_core::{PhoneNumber, UserId};

use crate::models::IssuedToken;

/// Errors from issuing or reading tokens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Token's `exp` is in the past.
    #[error("token expired")]
    Expired,
    /// Signature, structure or claims are wrong.
    #[error("invalid token: {0}")]
    Invalid(String),
    /// A token of the other kind was presented.
    #[error("token has the wrong purpose")]
    WrongPurpose,
    /// Signing failed.
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TokenPurpose {
    Session,
    Registration,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    jti: Uuid,
    iat: i64,
    exp: i64,
    purpose: TokenPurpose,
}

/// Verified contents of a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: UserId,
    pub jti: Uuid,
}

/// Issues and verifies tokens with one shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    session_ttl: TimeDelta,
    registration_ttl: TimeDelta,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("keys", &"[REDACTED]")
            .field("session_ttl", &self.session_ttl)
            .field("registration_ttl", &self.registration_ttl)
            .finish()
    }
}

impl TokenIssuer {
    /// Lifetime of registration tokens, in minutes.
    pub const REGISTRATION_TTL_MINUTES: i64 = 15;

    /// Create an issuer signing with `secret`.
    #[must_use]
    pub fn new(secret: &SecretString, session_ttl: TimeDelta) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            session_ttl,
            registration_ttl: TimeDelta::minutes(Self::REGISTRATION_TTL_MINUTES),
        }
    }

    /// Issue a session token for `user_id`.
    ///
    /// Returns the encoded token and the record to persist for revocation.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Encoding` if signing fails.
    pub fn issue_session(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(String, IssuedToken), TokenError> {
        let expires_at = now + self.session_ttl;
        let jti = Uuid::new_v4();
        let token = self.encode(&Claims {
            sub: user_id.to_string(),
            jti,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            purpose: TokenPurpose::Session,
        })?;

        Ok((
            token,
            IssuedToken {
                jti,
                user_id,
                issued_at: now,
                expires_at,
            },
        ))
    }

    /// Verify a session token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Expired`, `Invalid` or `WrongPurpose`.
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let claims = self.decode(token, TokenPurpose::Session)?;
        let user_id = claims
            .sub
            .parse::<i32>()
            .map(UserId::new)
            .map_err(|_| TokenError::Invalid("subject is not a user id".to_owned()))?;
        Ok(SessionClaims {
            user_id,
            jti: claims.jti,
        })
    }

    /// Issue a registration token for a verified phone number.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Encoding` if signing fails.
    pub fn issue_registration(
        &self,
        phone: &PhoneNumber,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        self.encode(&Claims {
            sub: phone.to_string(),
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + self.registration_ttl).timestamp(),
            purpose: TokenPurpose::Registration,
        })
    }

    /// Verify a registration token and return its phone number.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Expired`, `Invalid` or `WrongPurpose`.
    pub fn verify_registration(&self, token: &str) -> Result<PhoneNumber, TokenError> {
        let claims = self.decode(token, TokenPurpose::Registration)?;
        PhoneNumber::parse(&claims.sub)
            .map_err(|_| TokenError::Invalid("subject is not a phone number".to_owned()))
    }

    fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn decode(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            },
        )?;

        if data.claims.purpose != purpose {
            return Err(TokenError::WrongPurpose);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            &SecretString::from("kX9#mP2$vL5nQ8wR3tY6uI0oA4sD7fG1".to_owned()),
            TimeDelta::days(30),
        )
    }

    #[test]
    fn test_session_token_round_trip() {
        let issuer = issuer();
        let now = Utc::now();
        let (token, record) = issuer.issue_session(UserId::new(42), now).expect("issued");

        assert_eq!(record.user_id, UserId::new(42));
        assert_eq!(record.expires_at, now + TimeDelta::days(30));

        let claims = issuer.verify_session(&token).expect("valid");
        assert_eq!(claims.user_id, UserId::new(42));
        assert_eq!(claims.jti, record.jti);
    }

    #[test]
    fn test_expired_session_token() {
        let issuer = issuer();
        let long_ago = Utc::now() - TimeDelta::days(31);
        let (token, _) = issuer.issue_session(UserId::new(1), long_ago).expect("issued");
        assert_eq!(issuer.verify_session(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_token_from_other_secret_is_invalid() {
        let other = TokenIssuer::new(
            &SecretString::from("a-completely-different-secret-value!".to_owned()),
            TimeDelta::days(30),
        );
        let (token, _) = other.issue_session(UserId::new(1), Utc::now()).expect("issued");
        assert!(matches!(
            issuer().verify_session(&token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(
            issuer().verify_session("not-a-jwt"),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_purposes_are_not_interchangeable() {
        let issuer = issuer();
        let phone = PhoneNumber::parse("9999999999").expect("phone");
        let registration = issuer
            .issue_registration(&phone, Utc::now())
            .expect("issued");
        assert_eq!(
            issuer.verify_session(&registration),
            Err(TokenError::WrongPurpose)
        );

        let (session, _) = issuer.issue_session(UserId::new(1), Utc::now()).expect("issued");
        assert_eq!(
            issuer.verify_registration(&session),
            Err(TokenError::WrongPurpose)
        );

        assert_eq!(issuer.verify_registration(&registration), Ok(phone));
    }

    #[test]
    fn test_registration_token_expires_after_fifteen_minutes() {
        let issuer = issuer();
        let phone = PhoneNumber::parse("9999999999").expect("phone");
        let token = issuer
            .issue_registration(&phone, Utc::now() - TimeDelta::minutes(16))
            .expect("issued");
        assert_eq!(issuer.verify_registration(&token), Err(TokenError::Expired));
    }
}
