//! Payment intent, verification and order placement through the HTTP surface.

use axum::http::StatusCode;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use tapntag_integration_tests::{TestContext, checkout_signature};

const PHONE: &str = "9999999999";
const GATEWAY_ORDER: &str = "order_TEST123";
const PAYMENT: &str = "pay_TEST456";

fn shipping_address() -> Value {
    json!({
        "firstName": "Asha",
        "lastName": "Rao",
        "address": "12 MG Road",
        "city": "Bengaluru",
        "state": "Karnataka",
        "pinCode": "560001",
        "phone": PHONE,
    })
}

/// A signed-in shopper with two units of a 100.00 product in their cart.
async fn shopper_with_cart(ctx: &TestContext) -> String {
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;
    let product = ctx.add_product("Product X", 100).await;
    let added = ctx
        .post(
            "/cart/add",
            Some(&token),
            json!({ "productId": product.id, "quantity": 2 }),
        )
        .await;
    assert_eq!(added.status, StatusCode::OK, "{:?}", added.body);
    token
}

async fn verify(ctx: &TestContext, token: &str, payment_id: &str, signature: &str) -> StatusCode {
    ctx.post(
        "/orders/verify",
        Some(token),
        json!({
            "razorpay_order_id": GATEWAY_ORDER,
            "razorpay_payment_id": payment_id,
            "razorpay_signature": signature,
        }),
    )
    .await
    .status
}

fn place_body(total: f64, payment_id: &str) -> Value {
    json!({
        "totalAmount": total,
        "shippingAddress": shipping_address(),
        "paymentId": payment_id,
        "orderId": GATEWAY_ORDER,
    })
}

#[tokio::test]
async fn test_create_payment_intent() {
    let ctx = TestContext::new().await;
    let token = shopper_with_cart(&ctx).await;

    let intent = ctx
        .post(
            "/orders/create",
            Some(&token),
            json!({ "amount": 20_000, "currency": "INR", "receipt": "rcpt_1" }),
        )
        .await;
    assert_eq!(intent.status, StatusCode::OK, "{:?}", intent.body);
    assert_eq!(intent.body["id"], GATEWAY_ORDER);
    assert_eq!(intent.body["amount"], 20_000);
    assert_eq!(intent.body["status"], "created");

    let received = ctx.gateway.received_requests().await.expect("recorded");
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn test_create_payment_intent_rejects_bad_amount() {
    let ctx = TestContext::new().await;
    let token = shopper_with_cart(&ctx).await;

    let intent = ctx
        .post(
            "/orders/create",
            Some(&token),
            json!({ "amount": 0, "receipt": "rcpt_1" }),
        )
        .await;
    assert_eq!(intent.status, StatusCode::BAD_REQUEST);

    let received = ctx.gateway.received_requests().await.expect("recorded");
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let ctx = TestContext::new().await;
    let token = shopper_with_cart(&ctx).await;

    let status = verify(&ctx, &token, PAYMENT, &"0".repeat(64)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_place_without_verification_is_rejected() {
    let ctx = TestContext::new().await;
    let token = shopper_with_cart(&ctx).await;

    let placed = ctx
        .post("/orders", Some(&token), place_body(200.0, PAYMENT))
        .await;
    assert_eq!(placed.status, StatusCode::BAD_REQUEST);
    assert_eq!(placed.body["message"], "payment has not been verified");

    let cart = ctx.get("/cart", Some(&token)).await;
    assert_eq!(cart.body["cart"]["itemCount"], 2);
}

#[tokio::test]
async fn test_verify_then_place_order() {
    let ctx = TestContext::new().await;
    let token = shopper_with_cart(&ctx).await;

    let signature = checkout_signature(GATEWAY_ORDER, PAYMENT);
    assert_eq!(verify(&ctx, &token, PAYMENT, &signature).await, StatusCode::OK);

    let placed = ctx
        .post("/orders", Some(&token), place_body(200.0, PAYMENT))
        .await;
    assert_eq!(placed.status, StatusCode::OK, "{:?}", placed.body);
    let order = &placed.body["order"];
    assert_eq!(order["status"], "confirmed");
    assert_eq!(order["totalAmount"].as_f64(), Some(200.0));
    assert_eq!(order["paymentId"], PAYMENT);
    assert_eq!(order["orderId"], GATEWAY_ORDER);
    assert_eq!(order["items"][0]["productName"], "Product X");
    assert_eq!(order["items"][0]["quantity"], 2);
    assert_eq!(order["shippingAddress"]["pinCode"], "560001");

    let cart = ctx.get("/cart", Some(&token)).await;
    assert_eq!(cart.body["cart"]["items"], json!([]));

    let history = ctx.get("/orders/my-orders", Some(&token)).await;
    assert_eq!(history.status, StatusCode::OK);
    let orders = history.body["orders"].as_array().expect("orders");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["id"], order["id"]);
}

#[tokio::test]
async fn test_underpaid_intent_cannot_buy_the_cart() {
    let ctx = TestContext::new().await;
    let token = shopper_with_cart(&ctx).await;
    let underpaid = json!({
        "id": "order_UNDERPAID",
        "entity": "order",
        "amount": 100,
        "currency": "INR",
        "receipt": "rcpt_2",
        "status": "paid",
    });
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(underpaid.clone()))
        .with_priority(1)
        .mount(&ctx.gateway)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/orders/order_UNDERPAID"))
        .respond_with(ResponseTemplate::new(200).set_body_json(underpaid))
        .mount(&ctx.gateway)
        .await;

    let intent = ctx
        .post(
            "/orders/create",
            Some(&token),
            json!({ "amount": 100, "currency": "INR", "receipt": "rcpt_2" }),
        )
        .await;
    assert_eq!(intent.status, StatusCode::OK, "{:?}", intent.body);
    assert_eq!(intent.body["id"], "order_UNDERPAID");

    let placed = ctx
        .post(
            "/orders",
            Some(&token),
            json!({
                "totalAmount": 200.0,
                "shippingAddress": shipping_address(),
                "paymentId": PAYMENT,
                "orderId": "order_UNDERPAID",
                "signature": checkout_signature("order_UNDERPAID", PAYMENT),
            }),
        )
        .await;
    assert_eq!(placed.status, StatusCode::BAD_REQUEST, "{:?}", placed.body);
    assert_eq!(
        placed.body["message"],
        "payment amount 100 does not match cart total 20000 in minor units"
    );

    let history = ctx.get("/orders/my-orders", Some(&token)).await;
    assert_eq!(history.body["orders"], json!([]));
    let cart = ctx.get("/cart", Some(&token)).await;
    assert_eq!(cart.body["cart"]["itemCount"], 2);
}

#[tokio::test]
async fn test_total_mismatch_is_rejected() {
    let ctx = TestContext::new().await;
    let token = shopper_with_cart(&ctx).await;
    let signature = checkout_signature(GATEWAY_ORDER, PAYMENT);
    verify(&ctx, &token, PAYMENT, &signature).await;

    let placed = ctx
        .post("/orders", Some(&token), place_body(1.0, PAYMENT))
        .await;
    assert_eq!(placed.status, StatusCode::BAD_REQUEST);
    assert_eq!(placed.body["success"], false);

    let history = ctx.get("/orders/my-orders", Some(&token)).await;
    assert_eq!(history.body["orders"], json!([]));
}

#[tokio::test]
async fn test_invalid_shipping_address_is_rejected() {
    let ctx = TestContext::new().await;
    let token = shopper_with_cart(&ctx).await;
    let signature = checkout_signature(GATEWAY_ORDER, PAYMENT);

    let mut body = place_body(200.0, PAYMENT);
    body["signature"] = json!(signature);
    body["shippingAddress"]["pinCode"] = json!("5600");

    let placed = ctx.post("/orders", Some(&token), body).await;
    assert_eq!(placed.status, StatusCode::BAD_REQUEST);
    assert_eq!(placed.body["message"], "shipping address pinCode must be 6 digits");
}

#[tokio::test]
async fn test_empty_cart_cannot_be_ordered() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;

    let mut body = place_body(0.0, PAYMENT);
    body["signature"] = json!(checkout_signature(GATEWAY_ORDER, PAYMENT));

    let placed = ctx.post("/orders", Some(&token), body).await;
    assert_eq!(placed.status, StatusCode::BAD_REQUEST);
    assert_eq!(placed.body["message"], "cart is empty");
}

#[tokio::test]
async fn test_inline_signature_and_duplicate_payment() {
    let ctx = TestContext::new().await;
    let token = shopper_with_cart(&ctx).await;

    let mut body = place_body(200.0, PAYMENT);
    body["signature"] = json!(checkout_signature(GATEWAY_ORDER, PAYMENT));

    let first = ctx.post("/orders", Some(&token), body.clone()).await;
    assert_eq!(first.status, StatusCode::OK, "{:?}", first.body);

    let product_id = first.body["order"]["items"][0]["productId"].clone();
    ctx.post(
        "/cart/add",
        Some(&token),
        json!({ "productId": product_id, "quantity": 2 }),
    )
    .await;

    let replay = ctx.post("/orders", Some(&token), body).await;
    assert_eq!(replay.status, StatusCode::CONFLICT);

    let cart = ctx.get("/cart", Some(&token)).await;
    assert_eq!(cart.body["cart"]["itemCount"], 2);
}

#[tokio::test]
async fn test_proof_is_bound_to_the_verifying_user() {
    let ctx = TestContext::new().await;
    let owner = shopper_with_cart(&ctx).await;
    let signature = checkout_signature(GATEWAY_ORDER, PAYMENT);
    verify(&ctx, &owner, PAYMENT, &signature).await;

    let other = ctx.sign_up("8888888888", "other@example.com").await;
    let placed = ctx
        .post("/orders", Some(&other), place_body(0.0, PAYMENT))
        .await;
    assert_eq!(placed.status, StatusCode::BAD_REQUEST);
    assert_eq!(placed.body["message"], "payment has not been verified");
}

#[tokio::test]
async fn test_orders_require_authentication() {
    let ctx = TestContext::new().await;

    let history = ctx.get("/orders/my-orders", None).await;
    assert_eq!(history.status, StatusCode::UNAUTHORIZED);

    let intent = ctx
        .post("/orders/create", None, json!({ "amount": 100, "receipt": "r" }))
        .await;
    assert_eq!(intent.status, StatusCode::UNAUTHORIZED);
}
