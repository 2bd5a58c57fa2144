//! Bearer token authentication extractor.
//!
//! Every cart, order and profile handler takes [`RequireUser`], so no such
//! operation can run without a resolved user.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::{AppError, set_sentry_user};
use crate::services::auth::{AuthError, AuthService, Identity};
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Extractor that requires a valid bearer token.
///
/// Rejects with 401 when the token is missing or invalid, and 404 when the
/// token's user no longer exists.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireUser(identity): RequireUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", identity.user.first_name)
/// }
/// ```
pub struct RequireUser(pub Identity);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let identity = AuthService::new(state.repositories().users.as_ref(), state.tokens())
            .resolve(token)
            .await?;

        set_sentry_user(&identity.user.id, Some(identity.user.email.as_str()));

        Ok(Self(identity))
    }
}

/// The token from an `Authorization: Bearer` header, if any.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::Auth(AuthError::InvalidCredential))?;

    match value.strip_prefix(BEARER_PREFIX).map(str::trim) {
        Some("") => Ok(None),
        Some(token) => Ok(Some(token)),
        None => Err(AppError::Auth(AuthError::InvalidCredential)),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/cart");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).expect("request").into_parts().0
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert!(matches!(bearer_token(&parts(None)), Ok(None)));
        assert!(matches!(bearer_token(&parts(Some("Bearer "))), Ok(None)));
        assert!(matches!(
            bearer_token(&parts(Some("Bearer abc.def.ghi"))),
            Ok(Some("abc.def.ghi"))
        ));
        assert!(matches!(
            bearer_token(&parts(Some("Basic dXNlcjpwYXNz"))),
            Err(AppError::Auth(AuthError::InvalidCredential))
        ));
    }
}
