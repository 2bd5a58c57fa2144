//! Sign-in, registration, profile and logout through the HTTP surface.

use axum::http::{Method, StatusCode};
use serde_json::json;

use tapntag_integration_tests::TestContext;

const PHONE: &str = "9999999999";

#[tokio::test]
async fn test_new_user_registers_with_registration_token() {
    let ctx = TestContext::new().await;

    let send = ctx
        .post("/auth/send-otp", None, json!({ "phoneNumber": PHONE }))
        .await;
    assert_eq!(send.status, StatusCode::OK);
    assert_eq!(send.body["isNewUser"], true);
    assert!(send.body.get("otp").is_none());

    let code = ctx.sender.last_code(PHONE).expect("code sent");
    let verify = ctx
        .post(
            "/auth/verify-otp",
            None,
            json!({ "phoneNumber": PHONE, "otp": code }),
        )
        .await;
    assert_eq!(verify.status, StatusCode::OK);
    assert_eq!(verify.body["isNewUser"], true);
    assert!(verify.body.get("token").is_none());
    let registration_token = verify.body["registrationToken"]
        .as_str()
        .expect("registration token")
        .to_owned();

    let created = ctx
        .post(
            "/auth/create-account",
            None,
            json!({
                "registrationToken": registration_token,
                "firstName": "A",
                "lastName": "B",
                "email": "a@b.com",
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::OK, "{:?}", created.body);
    assert_eq!(created.body["isNewUser"], true);
    assert_eq!(created.body["user"]["phoneNumber"], PHONE);
    assert_eq!(created.body["user"]["email"], "a@b.com");
    let token = created.body["token"].as_str().expect("token");

    let cart = ctx.get("/cart", Some(token)).await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["cart"]["items"], json!([]));
    assert_eq!(cart.body["cart"]["itemCount"], 0);
}

#[tokio::test]
async fn test_registration_token_cannot_be_used_as_session() {
    let ctx = TestContext::new().await;
    let code = ctx.send_otp(PHONE).await;
    let verify = ctx
        .post(
            "/auth/verify-otp",
            None,
            json!({ "phoneNumber": PHONE, "otp": code }),
        )
        .await;
    let registration_token = verify.body["registrationToken"].as_str().expect("token");

    let response = ctx.get("/cart", Some(registration_token)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_existing_user_signs_in() {
    let ctx = TestContext::new().await;
    ctx.sign_up(PHONE, "shopper@example.com").await;

    let send = ctx
        .post("/auth/send-otp", None, json!({ "phoneNumber": PHONE }))
        .await;
    assert_eq!(send.body["isNewUser"], false);

    let code = ctx.sender.last_code(PHONE).expect("code sent");
    let verify = ctx
        .post(
            "/auth/verify-otp",
            None,
            json!({ "phoneNumber": PHONE, "otp": code }),
        )
        .await;
    assert_eq!(verify.status, StatusCode::OK);
    assert_eq!(verify.body["isNewUser"], false);
    assert_eq!(verify.body["user"]["email"], "shopper@example.com");
    assert!(verify.body["token"].is_string());
}

#[tokio::test]
async fn test_code_is_single_use() {
    let ctx = TestContext::new().await;
    ctx.sign_up(PHONE, "shopper@example.com").await;
    let code = ctx.send_otp(PHONE).await;
    let body = json!({ "phoneNumber": PHONE, "otp": code });

    let first = ctx.post("/auth/verify-otp", None, body.clone()).await;
    assert_eq!(first.status, StatusCode::OK);

    let second = ctx.post("/auth/verify-otp", None, body).await;
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(second.body["success"], false);
    assert_eq!(second.body["message"], "no OTP found for this phone number");
}

#[tokio::test]
async fn test_wrong_code_keeps_challenge() {
    let ctx = TestContext::new().await;
    let code = ctx.send_otp(PHONE).await;
    let wrong = if code == "1000" { "1001" } else { "1000" };

    let rejected = ctx
        .post(
            "/auth/verify-otp",
            None,
            json!({ "phoneNumber": PHONE, "otp": wrong }),
        )
        .await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert_eq!(rejected.body["message"], "invalid OTP");

    let accepted = ctx
        .post(
            "/auth/verify-otp",
            None,
            json!({ "phoneNumber": PHONE, "otp": code }),
        )
        .await;
    assert_eq!(accepted.status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_phone_is_rejected() {
    let ctx = TestContext::new().await;
    for phone in ["12345", "+919999999999", "99999 9999"] {
        let response = ctx
            .post("/auth/send-otp", None, json!({ "phoneNumber": phone }))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{phone}");
        assert_eq!(response.body["success"], false);
    }
}

#[tokio::test]
async fn test_otp_echo_in_development() {
    let ctx = TestContext::with_config(|config| config.otp_echo = true).await;
    let response = ctx
        .post("/auth/send-otp", None, json!({ "phoneNumber": PHONE }))
        .await;
    assert_eq!(
        response.body["otp"].as_str(),
        ctx.sender.last_code(PHONE).as_deref()
    );
}

#[tokio::test]
async fn test_otp_endpoints_are_rate_limited() {
    let ctx = TestContext::new().await;
    let mut statuses = Vec::new();
    for _ in 0..6 {
        let response = ctx
            .post("/auth/send-otp", None, json!({ "phoneNumber": PHONE }))
            .await;
        statuses.push(response.status);
    }

    assert!(statuses[..5].iter().all(|s| *s == StatusCode::OK));
    assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let ctx = TestContext::new().await;
    ctx.sign_up(PHONE, "shopper@example.com").await;

    let code = ctx.send_otp("8888888888").await;
    let response = ctx
        .post(
            "/auth/verify-otp",
            None,
            json!({
                "phoneNumber": "8888888888",
                "otp": code,
                "firstName": "Other",
                "lastName": "Person",
                "email": "Shopper@Example.com",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let ctx = TestContext::new().await;

    let missing = ctx.get("/cart", None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.body["success"], false);

    let garbage = ctx.get("/orders/my-orders", Some("not-a-token")).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_update() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;

    let updated = ctx
        .request(
            Method::PATCH,
            "/auth/profile",
            Some(&token),
            Some(json!({ "firstName": "  Asha ", "email": "asha@example.com" })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK, "{:?}", updated.body);
    assert_eq!(updated.body["user"]["firstName"], "Asha");
    assert_eq!(updated.body["user"]["lastName"], "Shopper");
    assert_eq!(updated.body["user"]["email"], "asha@example.com");

    let profile = ctx.get("/auth/profile", Some(&token)).await;
    assert_eq!(profile.body["user"]["firstName"], "Asha");

    let unknown_field = ctx
        .request(
            Method::PATCH,
            "/auth/profile",
            Some(&token),
            Some(json!({ "phoneNumber": "8888888888" })),
        )
        .await;
    assert_eq!(unknown_field.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;

    let logout = ctx
        .request(Method::POST, "/auth/logout", Some(&token), None)
        .await;
    assert_eq!(logout.status, StatusCode::OK);

    let after = ctx.get("/auth/profile", Some(&token)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoints() {
    let ctx = TestContext::new().await;
    assert_eq!(ctx.get("/health", None).await.status, StatusCode::OK);
    assert_eq!(ctx.get("/health/ready", None).await.status, StatusCode::OK);
}
