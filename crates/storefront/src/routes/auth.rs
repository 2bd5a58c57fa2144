//! Authentication route handlers.
//!
//! Phone sign-in is two steps: `send-otp` issues a code, `verify-otp` checks
//! it. A known phone gets a session token straight away. An unknown phone
//! either registers in the same call (when the account details are supplied)
//! or gets a short-lived registration token for `create-account`.
//!
//! Any guest cart sent along with a sign-in is merged into the account cart.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tapntag_core::PhoneNumber;

use super::json_body;
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::RequireUser;
use crate::models::{GuestCart, User};
use crate::services::auth::{AccountDetails, AuthService, ProfileChanges};
use crate::services::otp::{OtpVerifier, SEND_TIMEOUT};
use crate::services::reconcile::{GuestCartReconciler, ReconcileFailure};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub phone_number: String,
    pub otp: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub guest_cart: Option<GuestCart>,
}

impl VerifyOtpRequest {
    /// Account details, when all of them were supplied.
    fn account_details(&self) -> Option<AccountDetails> {
        match (&self.first_name, &self.last_name, &self.email) {
            (Some(first_name), Some(last_name), Some(email)) => Some(AccountDetails {
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                email: email.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub registration_token: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub guest_cart: Option<GuestCart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpResponse {
    pub success: bool,
    pub message: &'static str,
    pub is_new_user: bool,
    /// Only present when OTP echo is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

/// Result of merging the guest cart sent with a sign-in.
#[derive(Debug, Serialize)]
pub struct GuestCartSummary {
    pub merged: usize,
    pub failures: Vec<ReconcileFailure>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedInResponse {
    pub success: bool,
    pub token: String,
    pub user: User,
    pub is_new_user: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_cart: Option<GuestCartSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequiredResponse {
    pub success: bool,
    pub is_new_user: bool,
    pub registration_token: String,
}

/// `verify-otp` outcome.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum VerifyOtpResponse {
    SignedIn(SignedInResponse),
    RegistrationRequired(RegistrationRequiredResponse),
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: &'static str,
}

// =============================================================================
// Handlers
// =============================================================================

/// Issue a sign-in code for a phone number.
#[instrument(skip_all)]
pub async fn send_otp(
    State(state): State<AppState>,
    body: std::result::Result<Json<SendOtpRequest>, JsonRejection>,
) -> Result<Json<SendOtpResponse>> {
    let request = json_body(body)?;
    let issued = otp_verifier(&state)
        .request_challenge(request.phone_number.trim())
        .await?;

    Ok(Json(SendOtpResponse {
        success: true,
        message: "OTP sent successfully",
        is_new_user: issued.is_new_user,
        otp: state.config().otp_echo.then_some(issued.code),
    }))
}

/// Check a sign-in code.
#[instrument(skip_all)]
pub async fn verify_otp(
    State(state): State<AppState>,
    body: std::result::Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<VerifyOtpResponse>> {
    let mut request = json_body(body)?;
    let verified = otp_verifier(&state)
        .verify(request.phone_number.trim(), &request.otp)
        .await?;

    let auth = AuthService::new(state.repositories().users.as_ref(), state.tokens());
    let mut guest_cart = request.guest_cart.take();

    if let Some(user) = auth.account_for_phone(&verified.phone).await? {
        let response = sign_in(&state, user, false, guest_cart.as_mut()).await?;
        return Ok(Json(VerifyOtpResponse::SignedIn(response)));
    }

    match request.account_details() {
        Some(details) => {
            let user = auth.create_account(verified.phone, details).await?;
            let response = sign_in(&state, user, true, guest_cart.as_mut()).await?;
            Ok(Json(VerifyOtpResponse::SignedIn(response)))
        }
        None => Ok(Json(VerifyOtpResponse::RegistrationRequired(
            registration_required(&auth, &verified.phone)?,
        ))),
    }
}

/// Finish registration for a phone that passed OTP verification.
#[instrument(skip_all)]
pub async fn create_account(
    State(state): State<AppState>,
    body: std::result::Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<Json<SignedInResponse>> {
    let mut request = json_body(body)?;
    let auth = AuthService::new(state.repositories().users.as_ref(), state.tokens());

    let phone = auth.registered_phone(&request.registration_token)?;
    let user = auth
        .create_account(
            phone,
            AccountDetails {
                first_name: request.first_name,
                last_name: request.last_name,
                email: request.email,
            },
        )
        .await?;

    Ok(Json(
        sign_in(&state, user, true, request.guest_cart.as_mut()).await?,
    ))
}

/// The caller's profile.
pub async fn get_profile(RequireUser(identity): RequireUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        success: true,
        user: identity.user,
    })
}

/// Change name or email.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    body: std::result::Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<ProfileResponse>> {
    let request = json_body(body)?;
    let user = AuthService::new(state.repositories().users.as_ref(), state.tokens())
        .update_profile(
            &identity.user,
            ProfileChanges {
                first_name: request.first_name,
                last_name: request.last_name,
                email: request.email,
            },
        )
        .await?;

    Ok(Json(ProfileResponse {
        success: true,
        user,
    }))
}

/// Revoke the presented token.
#[instrument(skip_all, fields(user_id = %identity.user.id))]
pub async fn logout(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
) -> Result<Json<LogoutResponse>> {
    AuthService::new(state.repositories().users.as_ref(), state.tokens())
        .logout(&identity)
        .await?;
    clear_sentry_user();

    Ok(Json(LogoutResponse {
        success: true,
        message: "Logged out successfully",
    }))
}

// =============================================================================
// Helpers
// =============================================================================

fn otp_verifier(state: &AppState) -> OtpVerifier<'_> {
    OtpVerifier::new(
        state.challenges(),
        state.otp_sender(),
        state.repositories().users.as_ref(),
        SEND_TIMEOUT,
    )
}

fn registration_required(
    auth: &AuthService<'_>,
    phone: &PhoneNumber,
) -> Result<RegistrationRequiredResponse> {
    Ok(RegistrationRequiredResponse {
        success: true,
        is_new_user: true,
        registration_token: auth.registration_token(phone)?,
    })
}

/// Issue a session for `user` and merge any guest cart into theirs.
async fn sign_in(
    state: &AppState,
    user: User,
    is_new_user: bool,
    guest_cart: Option<&mut GuestCart>,
) -> Result<SignedInResponse> {
    let repos = state.repositories();
    let token = AuthService::new(repos.users.as_ref(), state.tokens())
        .sign_in(&user)
        .await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));

    let guest_cart = match guest_cart {
        Some(guest) if !guest.is_empty() => {
            let report = GuestCartReconciler::new(repos.carts.as_ref(), repos.products.as_ref())
                .reconcile(user.id, guest)
                .await?;
            Some(GuestCartSummary {
                merged: report.merged,
                failures: report.failures,
            })
        }
        _ => None,
    };

    Ok(SignedInResponse {
        success: true,
        token,
        user,
        is_new_user,
        guest_cart,
    })
}
