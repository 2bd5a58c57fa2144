//! User repository: accounts and their issued bearer tokens.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use tapntag_core::{Email, PhoneNumber, UserId};

use super::{RepositoryError, conflict_or_database, timed};
use crate::models::{IssuedToken, NewUser, ProfileUpdate, User};

/// Storage for accounts and issued tokens.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Get a user by ID.
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Get a user by phone number.
    async fn get_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, RepositoryError>;

    /// Get a user by email.
    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Create a user together with their empty cart.
    ///
    /// Returns `RepositoryError::Conflict` if the phone or email is taken.
    async fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError>;

    /// Apply a profile update.
    ///
    /// Returns `RepositoryError::NotFound` for an unknown user and
    /// `RepositoryError::Conflict` if the new email is taken.
    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError>;

    /// Record a newly issued token.
    async fn record_token(&self, token: &IssuedToken) -> Result<(), RepositoryError>;

    /// Whether `jti` was issued to `user_id`, is unexpired and not revoked.
    async fn is_token_active(
        &self,
        user_id: UserId,
        jti: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Revoke a token. Returns `false` if it was unknown or already revoked.
    async fn revoke_token(&self, user_id: UserId, jti: Uuid) -> Result<bool, RepositoryError>;
}

/// `PostgreSQL` implementation of [`UserRepository`].
pub struct PgUserRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgUserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn user_from_row(row: &PgRow) -> Result<User, RepositoryError> {
    let phone: String = row.try_get("phone_number")?;
    let email: String = row.try_get("email")?;

    let phone_number = PhoneNumber::parse(&phone).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid phone number in database: {e}"))
    })?;
    let email = Email::parse(&email)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid email in database: {e}")))?;

    Ok(User {
        id: row.try_get("id")?,
        phone_number,
        email,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        timed(self.timeout, async {
            let row = sqlx::query(
                r"
                SELECT id, phone_number, email, first_name, last_name, created_at
                FROM storefront.user
                WHERE id = $1
                ",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(user_from_row).transpose()
        })
        .await
    }

    async fn get_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, RepositoryError> {
        timed(self.timeout, async {
            let row = sqlx::query(
                r"
                SELECT id, phone_number, email, first_name, last_name, created_at
                FROM storefront.user
                WHERE phone_number = $1
                ",
            )
            .bind(phone.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(user_from_row).transpose()
        })
        .await
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        timed(self.timeout, async {
            let row = sqlx::query(
                r"
                SELECT id, phone_number, email, first_name, last_name, created_at
                FROM storefront.user
                WHERE email = $1
                ",
            )
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(user_from_row).transpose()
        })
        .await
    }

    async fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError> {
        timed(self.timeout, async {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query(
                r"
                INSERT INTO storefront.user (phone_number, email, first_name, last_name)
                VALUES ($1, $2, $3, $4)
                RETURNING id, phone_number, email, first_name, last_name, created_at
                ",
            )
            .bind(new_user.phone_number.as_str())
            .bind(new_user.email.as_str())
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .fetch_one(&mut *tx)
            .await
            .map_err(conflict_or_database)?;

            let user = user_from_row(&row)?;

            // Every account starts with an empty cart
            sqlx::query("INSERT INTO storefront.cart (user_id) VALUES ($1)")
                .bind(user.id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(user)
        })
        .await
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        timed(self.timeout, async {
            let row = sqlx::query(
                r"
                UPDATE storefront.user
                SET first_name = COALESCE($2, first_name),
                    last_name = COALESCE($3, last_name),
                    email = COALESCE($4, email),
                    updated_at = now()
                WHERE id = $1
                RETURNING id, phone_number, email, first_name, last_name, created_at
                ",
            )
            .bind(id)
            .bind(update.first_name.as_deref())
            .bind(update.last_name.as_deref())
            .bind(update.email.as_ref().map(Email::as_str))
            .fetch_optional(&self.pool)
            .await
            .map_err(conflict_or_database)?;

            row.as_ref()
                .map(user_from_row)
                .transpose()?
                .ok_or(RepositoryError::NotFound)
        })
        .await
    }

    async fn record_token(&self, token: &IssuedToken) -> Result<(), RepositoryError> {
        timed(self.timeout, async {
            sqlx::query(
                r"
                INSERT INTO storefront.user_token (jti, user_id, issued_at, expires_at)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(token.jti)
            .bind(token.user_id)
            .bind(token.issued_at)
            .bind(token.expires_at)
            .execute(&self.pool)
            .await
            .map_err(conflict_or_database)?;
            Ok(())
        })
        .await
    }

    async fn is_token_active(
        &self,
        user_id: UserId,
        jti: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        timed(self.timeout, async {
            let active: bool = sqlx::query_scalar(
                r"
                SELECT EXISTS (
                    SELECT 1 FROM storefront.user_token
                    WHERE jti = $1 AND user_id = $2
                      AND revoked_at IS NULL AND expires_at > $3
                )
                ",
            )
            .bind(jti)
            .bind(user_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
            Ok(active)
        })
        .await
    }

    async fn revoke_token(&self, user_id: UserId, jti: Uuid) -> Result<bool, RepositoryError> {
        timed(self.timeout, async {
            let result = sqlx::query(
                r"
                UPDATE storefront.user_token
                SET revoked_at = now()
                WHERE jti = $1 AND user_id = $2 AND revoked_at IS NULL
                ",
            )
            .bind(jti)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
