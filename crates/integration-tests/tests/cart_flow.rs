//! Cart management through the HTTP surface.

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;

use tapntag_core::Price;
use tapntag_integration_tests::TestContext;

const PHONE: &str = "9999999999";

fn item_id(body: &serde_json::Value, index: usize) -> i64 {
    body["cart"]["items"][index]["_id"]
        .as_i64()
        .expect("cart line id")
}

#[tokio::test]
async fn test_add_update_remove() {
    let ctx = TestContext::new().await;
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
    assert_eq!(added.body["cart"]["subtotal"].as_f64(), Some(200.0));
    assert_eq!(added.body["cart"]["itemCount"], 2);
    assert_eq!(added.body["cart"]["items"][0]["product"]["name"], "Product X");
    let line = item_id(&added.body, 0);

    let updated = ctx
        .request(
            Method::PUT,
            &format!("/cart/update/{line}"),
            Some(&token),
            Some(json!({ "quantity": 5 })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["cart"]["subtotal"].as_f64(), Some(500.0));
    assert_eq!(updated.body["cart"]["items"][0]["lineTotal"].as_f64(), Some(500.0));

    let removed = ctx
        .request(
            Method::DELETE,
            &format!("/cart/remove/{line}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.body["cart"]["items"], json!([]));
    assert_eq!(removed.body["cart"]["subtotal"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn test_quantity_defaults_to_one() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;
    let product = ctx.add_product("Product X", 100).await;

    let added = ctx
        .post("/cart/add", Some(&token), json!({ "productId": product.id }))
        .await;
    assert_eq!(added.body["cart"]["items"][0]["quantity"], 1);
}

#[tokio::test]
async fn test_adding_same_product_twice_merges_lines() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;
    let product = ctx.add_product("Product X", 100).await;
    let body = json!({ "productId": product.id, "quantity": 2 });

    ctx.post("/cart/add", Some(&token), body.clone()).await;
    let second = ctx.post("/cart/add", Some(&token), body).await;

    let items = second.body["cart"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 4);
}

#[tokio::test]
async fn test_quantity_limits() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;
    let product = ctx.add_product("Product X", 100).await;

    let zero = ctx
        .post(
            "/cart/add",
            Some(&token),
            json!({ "productId": product.id, "quantity": 0 }),
        )
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    ctx.post(
        "/cart/add",
        Some(&token),
        json!({ "productId": product.id, "quantity": 98 }),
    )
    .await;
    let over = ctx
        .post(
            "/cart/add",
            Some(&token),
            json!({ "productId": product.id, "quantity": 2 }),
        )
        .await;
    assert_eq!(over.status, StatusCode::BAD_REQUEST);
    assert_eq!(over.body["success"], false);

    let cart = ctx.get("/cart", Some(&token)).await;
    assert_eq!(cart.body["cart"]["items"][0]["quantity"], 98);
}

#[tokio::test]
async fn test_price_frozen_at_add_time() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;
    let product = ctx.add_product("Product X", 100).await;

    ctx.post(
        "/cart/add",
        Some(&token),
        json!({ "productId": product.id, "quantity": 1 }),
    )
    .await;
    ctx.store
        .set_product_price(product.id, Price::new(Decimal::from(150)).expect("price"))
        .await
        .expect("price changed");

    let cart = ctx.get("/cart", Some(&token)).await;
    assert_eq!(cart.body["cart"]["items"][0]["price"].as_f64(), Some(100.0));
    assert_eq!(cart.body["cart"]["items"][0]["product"]["price"].as_f64(), Some(150.0));
    assert_eq!(cart.body["cart"]["subtotal"].as_f64(), Some(100.0));
}

#[tokio::test]
async fn test_unknown_product_and_line() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;

    let unknown = ctx
        .post(
            "/cart/add",
            Some(&token),
            json!({ "productId": 424_242, "quantity": 1 }),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.body["message"], "Product not found");

    let missing_line = ctx
        .request(
            Method::PUT,
            "/cart/update/77",
            Some(&token),
            Some(json!({ "quantity": 1 })),
        )
        .await;
    assert_eq!(missing_line.status, StatusCode::NOT_FOUND);

    let bad_path = ctx
        .request(Method::DELETE, "/cart/remove/abc", Some(&token), None)
        .await;
    assert_eq!(bad_path.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clear_is_repeatable() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;
    let product = ctx.add_product("Product X", 100).await;
    ctx.post("/cart/add", Some(&token), json!({ "productId": product.id }))
        .await;

    for _ in 0..2 {
        let cleared = ctx
            .request(Method::DELETE, "/cart/clear", Some(&token), None)
            .await;
        assert_eq!(cleared.status, StatusCode::OK);
        assert_eq!(cleared.body["cart"]["items"], json!([]));
    }
}

#[tokio::test]
async fn test_carts_are_per_user() {
    let ctx = TestContext::new().await;
    let first = ctx.sign_up(PHONE, "first@example.com").await;
    let second = ctx.sign_up("8888888888", "second@example.com").await;
    let product = ctx.add_product("Product X", 100).await;

    let added = ctx
        .post("/cart/add", Some(&first), json!({ "productId": product.id }))
        .await;
    let line = item_id(&added.body, 0);

    let other = ctx.get("/cart", Some(&second)).await;
    assert_eq!(other.body["cart"]["items"], json!([]));

    let foreign_remove = ctx
        .request(
            Method::DELETE,
            &format!("/cart/remove/{line}"),
            Some(&second),
            None,
        )
        .await;
    assert_eq!(foreign_remove.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_merge_guest_cart_reports_failures() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;
    let kept = ctx.add_product("Product X", 100).await;
    let gone = ctx.add_product("Retired Card", 80).await;
    ctx.store.delete_product(gone.id).await;

    let merged = ctx
        .post(
            "/cart/merge",
            Some(&token),
            json!({
                "items": [
                    { "_id": kept.id, "name": "Product X", "price": 1, "quantity": 3 },
                    { "_id": gone.id, "name": "Retired Card", "quantity": 1 },
                ]
            }),
        )
        .await;
    assert_eq!(merged.status, StatusCode::OK, "{:?}", merged.body);
    assert_eq!(merged.body["merged"], 1);
    assert_eq!(merged.body["failures"][0]["name"], "Retired Card");
    // The catalog price wins over the client snapshot.
    assert_eq!(merged.body["cart"]["subtotal"].as_f64(), Some(300.0));
}

#[tokio::test]
async fn test_merge_keeps_valid_lines_beside_malformed_ones() {
    let ctx = TestContext::new().await;
    let token = ctx.sign_up(PHONE, "shopper@example.com").await;
    let kept = ctx.add_product("Product X", 100).await;

    let merged = ctx
        .post(
            "/cart/merge",
            Some(&token),
            json!({
                "items": [
                    { "_id": kept.id, "quantity": 2 },
                    { "_id": "64f1c2a9e4b0a1b2c3d4e5f6", "name": "Legacy Card", "quantity": 1 },
                    { "_id": kept.id },
                ]
            }),
        )
        .await;
    assert_eq!(merged.status, StatusCode::OK, "{:?}", merged.body);
    assert_eq!(merged.body["merged"], 1);
    assert_eq!(merged.body["failures"].as_array().map(Vec::len), Some(2));
    assert_eq!(merged.body["failures"][0]["reason"], "malformed line");
    assert_eq!(merged.body["failures"][0]["name"], "Legacy Card");

    let cart = ctx.get("/cart", Some(&token)).await;
    assert_eq!(cart.body["cart"]["itemCount"], 2);
}

#[tokio::test]
async fn test_malformed_guest_line_does_not_block_sign_in() {
    let ctx = TestContext::new().await;
    ctx.sign_up(PHONE, "shopper@example.com").await;
    let product = ctx.add_product("Product X", 100).await;
    let code = ctx.send_otp(PHONE).await;

    let signed_in = ctx
        .post(
            "/auth/verify-otp",
            None,
            json!({
                "phoneNumber": PHONE,
                "otp": code,
                "guestCart": { "items": [
                    { "_id": "64f1c2a9e4b0a1b2c3d4e5f6", "quantity": 1 },
                    { "_id": product.id, "quantity": 1 },
                ] },
            }),
        )
        .await;
    assert_eq!(signed_in.status, StatusCode::OK, "{:?}", signed_in.body);
    assert_eq!(signed_in.body["guestCart"]["merged"], 1);
    assert_eq!(signed_in.body["guestCart"]["failures"][0]["reason"], "malformed line");
}

#[tokio::test]
async fn test_guest_cart_merged_at_sign_in() {
    let ctx = TestContext::new().await;
    ctx.sign_up(PHONE, "shopper@example.com").await;
    let product = ctx.add_product("Product X", 100).await;
    let code = ctx.send_otp(PHONE).await;

    let signed_in = ctx
        .post(
            "/auth/verify-otp",
            None,
            json!({
                "phoneNumber": PHONE,
                "otp": code,
                "guestCart": { "items": [{ "_id": product.id, "quantity": 2 }] },
            }),
        )
        .await;
    assert_eq!(signed_in.status, StatusCode::OK, "{:?}", signed_in.body);
    assert_eq!(signed_in.body["guestCart"]["merged"], 1);

    let token = signed_in.body["token"].as_str().expect("token");
    let cart = ctx.get("/cart", Some(token)).await;
    assert_eq!(cart.body["cart"]["itemCount"], 2);
}

#[tokio::test]
async fn test_catalog_listing() {
    let ctx = TestContext::new().await;
    let product = ctx.add_product("Product X", 100).await;

    let list = ctx.get("/products", None).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body["products"][0]["name"], "Product X");

    let one = ctx.get(&format!("/products/{}", product.id), None).await;
    assert_eq!(one.body["product"]["price"].as_f64(), Some(100.0));

    let missing = ctx.get("/products/999999", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}
