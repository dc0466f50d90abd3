#![allow(dead_code)]

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use retailos_api::{
    config::AppConfig,
    db,
    services::{
        tenants::{CreateTenantRequest, TenantAdmin, TenantService},
        users::UserService,
    },
    tenancy::SUBDOMAIN_HEADER,
    AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

pub const JWT_SECRET: &str =
    "integration_test_signing_key_Qm7vXw2LpZr9TkYs4NdHb8JcGf6EaRu3WiOy5Vx1Mq";
pub const OPERATOR_EMAIL: &str = "ops@retailos.test";
pub const OPERATOR_PASSWORD: &str = "operator-password";
pub const ADMIN_PASSWORD: &str = "store-admin-password";

/// Store admin e-mail for a provisioned subdomain
pub fn admin_email(subdomain: &str) -> String {
    format!("owner@{}.test", subdomain)
}

/// Application backed by file SQLite databases in a temporary directory:
/// one platform database plus one per provisioned store.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller adjust the configuration,
    /// e.g. to point the AI or Stripe base URLs at a mock server.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().display().to_string();

        let mut cfg = AppConfig::new(
            format!("sqlite://{}/master.db?mode=rwc", root),
            format!("sqlite://{}/{{db_name}}.db?mode=rwc", root),
            JWT_SECRET.to_string(),
            3600,
            86_400,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 2;
        cfg.db_min_connections = 1;
        adjust(&mut cfg);

        let master = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("connect platform database");
        db::run_master_migrations(&master)
            .await
            .expect("migrate platform database");
        let master = std::sync::Arc::new(master);

        UserService::new(master.clone())
            .ensure_superadmin(OPERATOR_EMAIL, OPERATOR_PASSWORD)
            .await
            .expect("bootstrap platform operator");

        let state = AppState::new(cfg, master).expect("build app state");
        let router = retailos_api::app_router(state.clone());

        Self {
            router,
            state,
            _dir: dir,
        }
    }

    /// Registers a store with an admin account and provisions its database
    pub async fn provision_store(&self, subdomain: &str) {
        TenantService::new(self.state.tenants.clone())
            .create_tenant(CreateTenantRequest {
                subdomain: subdomain.to_string(),
                store_name: format!("{} market", subdomain),
                latitude: None,
                longitude: None,
                store_address: None,
                store_phone: None,
                store_email: None,
                admin: Some(TenantAdmin {
                    email: admin_email(subdomain),
                    full_name: "Store Owner".to_string(),
                    password: ADMIN_PASSWORD.to_string(),
                }),
            })
            .await
            .expect("provision store");
    }

    /// Logs in through the API and returns the access token
    pub async fn login(&self, subdomain: Option<&str>, email: &str, password: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/v1/auth/login",
                subdomain,
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(response.status(), 200, "login failed for {}", email);
        let body = json_body(response).await;
        body["data"]["access_token"]
            .as_str()
            .expect("access token in login response")
            .to_string()
    }

    /// Provisions a store and logs in as its admin
    pub async fn store_admin(&self, subdomain: &str) -> String {
        self.provision_store(subdomain).await;
        self.login(Some(subdomain), &admin_email(subdomain), ADMIN_PASSWORD)
            .await
    }

    /// Operators log in on a system subdomain, which maps to the platform database
    pub async fn operator_token(&self) -> String {
        self.login(Some("admin"), OPERATOR_EMAIL, OPERATOR_PASSWORD)
            .await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        subdomain: Option<&str>,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(sub) = subdomain {
            builder = builder.header(SUBDOMAIN_HEADER, sub);
        }
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }

    /// Authenticated request against a store, returning status and JSON body
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        subdomain: &str,
        token: &str,
        body: Option<Value>,
    ) -> (u16, Value) {
        let response = self
            .request(method, uri, Some(subdomain), Some(token), body)
            .await;
        let status = response.status().as_u16();
        (status, json_body(response).await)
    }

    /// Creates a product through the API and returns its id
    pub async fn create_product(
        &self,
        subdomain: &str,
        token: &str,
        name: &str,
        stock: i32,
        cost: &str,
        price: &str,
    ) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/products",
                subdomain,
                token,
                Some(json!({
                    "name": name,
                    "category": "Grocery",
                    "cost_price": cost,
                    "selling_price": price,
                    "stock": stock,
                    "reorder_level": 5,
                })),
            )
            .await;
        assert_eq!(status, 201, "create product failed: {}", body);
        body["data"]["id"].as_str().expect("product id").to_string()
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    })
}
