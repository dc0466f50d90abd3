//! Third-party integrations behind the API: OpenAI and Stripe, mocked with wiremock.

mod common;

use axum::http::Method;
use common::TestApp;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn ai_endpoints_need_a_configured_key() {
    let app = TestApp::new().await;
    let token = app.store_admin("alpha").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/ai/product-description",
            "alpha",
            &token,
            Some(json!({ "name": "Olive oil" })),
        )
        .await;
    assert_eq!(status, 400, "{}", body);
    assert!(body["message"].as_str().unwrap_or_default().contains("openai_api_key"));
}

#[tokio::test]
async fn product_description_comes_from_chat_completions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-integration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "role": "assistant", "content": "  Cold pressed and fruity.  " }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let app = TestApp::with_config(|cfg| {
        cfg.openai_api_key = Some("sk-integration".to_string());
        cfg.openai_base_url = uri;
    })
    .await;
    let token = app.store_admin("alpha").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/ai/product-description",
            "alpha",
            &token,
            Some(json!({ "name": "Olive oil", "category": "Pantry" })),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["description"], "Cold pressed and fruity.");
}

#[tokio::test]
async fn committed_invoice_receives_stock_and_creates_products() {
    let app = TestApp::new().await;
    let token = app.store_admin("alpha").await;
    let rice = app
        .create_product("alpha", &token, "Rice 5kg", 4, "6.00", "9.00")
        .await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/invoices/commit",
            "alpha",
            &token,
            Some(json!({
                "supplier_name": "Acme Foods",
                "invoice_number": "INV-77",
                "invoice_date": "2024-05-01",
                "total_amount": "80.00",
                "vendor": { "name": "Acme Foods", "email": "sales@acme.test" },
                "items": [
                    { "product_name": "rice 5kg", "quantity": 10, "unit_cost": "5.50" },
                    { "product_name": "Hot Sauce", "quantity": 5, "line_total": "10.00" }
                ]
            })),
        )
        .await;
    assert_eq!(status, 201, "{}", body);
    assert_eq!(body["data"]["items_committed"], 2);
    assert_eq!(body["data"]["inventory_items_updated"], 1);
    assert_eq!(body["data"]["inventory_items_created"], 1);

    let (_, product) = app
        .call(
            Method::GET,
            &format!("/api/v1/products/{}", rice),
            "alpha",
            &token,
            None,
        )
        .await;
    assert_eq!(product["data"]["stock"], 14);

    let (status, history) = app
        .call(Method::GET, "/api/v1/invoices", "alpha", &token, None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(history["data"][0]["invoice_number"], "INV-77");

    let (_, vendors) = app
        .call(Method::GET, "/api/v1/vendors/search?q=acme", "alpha", &token, None)
        .await;
    assert_eq!(vendors["data"].as_array().map(|v| v.len()), Some(1));
}

#[tokio::test]
async fn empty_invoices_are_rejected() {
    let app = TestApp::new().await;
    let token = app.store_admin("alpha").await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/invoices/commit",
            "alpha",
            &token,
            Some(json!({ "supplier_name": "Nobody", "items": [] })),
        )
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn payment_intent_uses_the_store_stripe_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_int_1",
            "client_secret": "pi_int_1_secret",
            "amount": 500,
            "currency": "usd",
            "status": "requires_payment_method"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let app = TestApp::with_config(|cfg| cfg.stripe_api_base_url = uri).await;
    let token = app.store_admin("alpha").await;
    let tea = app
        .create_product("alpha", &token, "Green tea", 10, "1.00", "2.50")
        .await;

    let (status, order) = app
        .call(
            Method::POST,
            "/api/v1/orders",
            "alpha",
            &token,
            Some(json!({ "items": [{ "product_id": tea, "quantity": 2 }] })),
        )
        .await;
    assert_eq!(status, 201, "{}", order);
    let order_id = order["data"]["id"].as_str().unwrap().to_string();
    let intent_uri = format!("/api/v1/orders/{}/payment-intent", order_id);

    let (status, _) = app
        .call(Method::POST, &intent_uri, "alpha", &token, None)
        .await;
    assert_eq!(status, 400, "payments are off until keys are saved");

    let (status, settings) = app
        .call(
            Method::PUT,
            "/api/v1/settings/payment",
            "alpha",
            &token,
            Some(json!({
                "stripe_publishable_key": "pk_test_alpha",
                "stripe_secret_key": "sk_test_alpha"
            })),
        )
        .await;
    assert_eq!(status, 200, "{}", settings);
    assert_eq!(settings["data"]["payment_enabled"], true);

    let (status, body) = app
        .call(Method::POST, &intent_uri, "alpha", &token, None)
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["payment_intent"]["id"], "pi_int_1");

    let (_, stored) = app
        .call(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            "alpha",
            &token,
            None,
        )
        .await;
    assert_eq!(stored["data"]["payment_intent_id"], "pi_int_1");
}
