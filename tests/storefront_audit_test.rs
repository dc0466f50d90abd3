//! Storefront checkout, shelf audits and flash sales over HTTP.

mod common;

use axum::http::Method;
use common::{json_body, TestApp};
use serde_json::{json, Value};

async fn stock_of(app: &TestApp, token: &str, product_id: &str) -> i64 {
    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/products/{}", product_id),
            "alpha",
            token,
            None,
        )
        .await;
    assert_eq!(status, 200);
    body["data"]["stock"].as_i64().expect("stock")
}

async fn register_shopper(app: &TestApp) -> String {
    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some("alpha"),
            None,
            Some(json!({
                "email": "shopper@example.com",
                "password": "shopper-password",
                "full_name": "Sam Shopper"
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = json_body(response).await;
    body["data"]["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn shoppers_browse_and_check_out() {
    let app = TestApp::new().await;
    let admin = app.store_admin("alpha").await;
    let honey = app
        .create_product("alpha", &admin, "Wildflower honey", 4, "3.00", "6.50")
        .await;
    app.create_product("alpha", &admin, "Sold out jam", 0, "1.00", "3.00")
        .await;
    let shopper = register_shopper(&app).await;

    let (status, products) = app
        .call(Method::GET, "/api/v1/shop/products", "alpha", &shopper, None)
        .await;
    assert_eq!(status, 200, "{}", products);
    let names: Vec<&str> = products["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Wildflower honey"]);

    let (status, categories) = app
        .call(Method::GET, "/api/v1/shop/categories", "alpha", &shopper, None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(categories["data"][0], json!({ "name": "Grocery", "count": 1 }));

    let (status, order) = app
        .call(
            Method::POST,
            "/api/v1/shop/checkout",
            "alpha",
            &shopper,
            Some(json!({
                "items": [{ "product_id": honey, "quantity": 3 }],
                "delivery_address": "4 Mill Lane",
                "payment_method": "card"
            })),
        )
        .await;
    assert_eq!(status, 201, "{}", order);
    assert_eq!(order["data"]["order_status"], "processing");
    assert_eq!(stock_of(&app, &admin, &honey).await, 1);

    // the remaining unit cannot cover another three
    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/shop/checkout",
            "alpha",
            &shopper,
            Some(json!({ "items": [{ "product_id": honey, "quantity": 3 }] })),
        )
        .await;
    assert_eq!(status, 422);
    assert_eq!(stock_of(&app, &admin, &honey).await, 1);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/shop/checkout",
            "alpha",
            &shopper,
            Some(json!({ "items": [] })),
        )
        .await;
    assert_eq!(status, 400);

    let (_, orders) = app
        .call(Method::GET, "/api/v1/orders", "alpha", &admin, None)
        .await;
    assert_eq!(orders["data"].as_array().map(|o| o.len()), Some(1));
}

#[tokio::test]
async fn shoppers_cannot_run_audits() {
    let app = TestApp::new().await;
    app.provision_store("alpha").await;
    let shopper = register_shopper(&app).await;

    let (status, _) = app
        .call(Method::POST, "/api/v1/audits/start", "alpha", &shopper, None)
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn shelf_audit_books_counted_differences() {
    let app = TestApp::new().await;
    let admin = app.store_admin("alpha").await;
    let rice = app
        .create_product("alpha", &admin, "Rice 1kg", 10, "1.00", "2.00")
        .await;
    let oil = app
        .create_product("alpha", &admin, "Olive oil", 3, "4.00", "7.00")
        .await;

    let (status, started) = app
        .call(Method::POST, "/api/v1/audits/start", "alpha", &admin, None)
        .await;
    assert_eq!(status, 201, "{}", started);
    assert_eq!(started["data"]["status"], "in_progress");
    assert_eq!(started["data"]["expected_items_count"], 2);
    let audit_id = started["data"]["id"].as_str().unwrap().to_string();

    let (status, summary) = app
        .call(
            Method::POST,
            &format!("/api/v1/audits/{}/complete", audit_id),
            "alpha",
            &admin,
            Some(json!({
                "items": [
                    { "product_id": rice, "actual_quantity": 7 },
                    { "product_id": oil, "actual_quantity": 5 }
                ]
            })),
        )
        .await;
    assert_eq!(status, 200, "{}", summary);
    assert_eq!(summary["data"]["status"], "applied");
    assert_eq!(summary["data"]["items_adjusted"], 2);
    assert_eq!(summary["data"]["total_discrepancy"], 5);
    assert_eq!(stock_of(&app, &admin, &rice).await, 7);
    assert_eq!(stock_of(&app, &admin, &oil).await, 5);

    let (_, detail) = app
        .call(
            Method::GET,
            &format!("/api/v1/audits/{}", audit_id),
            "alpha",
            &admin,
            None,
        )
        .await;
    assert_eq!(detail["data"]["total_loss"], 3);
    assert_eq!(detail["data"]["total_gain"], 2);

    // completing twice is a state conflict
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/audits/{}/complete", audit_id),
            "alpha",
            &admin,
            Some(json!({ "items": [{ "product_id": rice, "actual_quantity": 1 }] })),
        )
        .await;
    assert_eq!(status, 409);

    let (_, history) = app
        .call(Method::GET, "/api/v1/audits/history", "alpha", &admin, None)
        .await;
    assert_eq!(history["data"][0]["items_count"], 2);
}

#[tokio::test]
async fn slow_movers_can_be_pushed_to_a_flash_sale() {
    let app = TestApp::new().await;
    let admin = app.store_admin("alpha").await;
    let beans = app
        .create_product("alpha", &admin, "Dry beans", 60, "0.50", "1.20")
        .await;

    let (status, pushed) = app
        .call(
            Method::POST,
            "/api/v1/campaigns/push-to-sale",
            "alpha",
            &admin,
            Some(json!({
                "product_ids": [beans],
                "discount_percent": 30,
                "channel": "both",
                "duration_days": 5
            })),
        )
        .await;
    assert_eq!(status, 201, "{}", pushed);
    assert_eq!(pushed["data"]["campaign"]["campaign_type"], "flash_sale");
    assert!(pushed["data"]["social_post"]["text"]
        .as_str()
        .unwrap_or_default()
        .contains("Dry beans"));

    let (_, active) = app
        .call(Method::GET, "/api/v1/campaigns/active", "alpha", &admin, None)
        .await;
    let titles: Vec<Value> = active["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].clone())
        .collect();
    assert_eq!(titles, vec![json!("30% Off Flash Sale")]);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/campaigns/push-to-sale",
            "alpha",
            &admin,
            Some(json!({ "product_ids": [beans], "discount_percent": 0, "channel": "website" })),
        )
        .await;
    assert_eq!(status, 400);
}
