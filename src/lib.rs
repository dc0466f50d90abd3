//! RetailOS API Library
//!
//! Multi-store retail back office: a platform (master) database holding the
//! store registry and shared catalog, plus one database per store for
//! inventory, sales, purchasing and finance.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod integrations;
pub mod middleware_helpers;
pub mod openapi;
pub mod services;
pub mod tenancy;
pub mod tracing;

use axum::{extract::Extension, response::Json, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{resources, AuthRouterExt, AuthService};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::integrations::{AiClient, StripeClient};
use crate::services::supplier_quotes::QuoteBooks;
use crate::tenancy::TenantRegistry;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub master_db: Arc<DatabaseConnection>,
    pub tenants: Arc<TenantRegistry>,
    pub auth_service: Arc<AuthService>,
    pub ai: Arc<AiClient>,
    pub stripe: Arc<StripeClient>,
    pub quotes: Arc<QuoteBooks>,
}

impl AppState {
    pub fn new(config: AppConfig, master_db: Arc<DatabaseConnection>) -> Result<Self, ServiceError> {
        let config = Arc::new(config);
        Ok(Self {
            tenants: Arc::new(TenantRegistry::new(config.clone(), master_db.clone())),
            auth_service: Arc::new(AuthService::new(auth::AuthConfig::from(config.as_ref()))),
            ai: Arc::new(AiClient::new(&config)?),
            stripe: Arc::new(StripeClient::new(&config)?),
            quotes: Arc::new(QuoteBooks::new()),
            master_db,
            config,
        })
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        let total_pages = if per_page == 0 { 0 } else { total.div_ceil(per_page) };
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ServiceError>;

/// Every `/api/v1` route, grouped by resource and gated by permission
pub fn api_v1_routes() -> Router<AppState> {
    let public = Router::new()
        .merge(handlers::system::routes())
        .merge(handlers::auth::public_routes());

    let me = handlers::auth::session_routes().with_auth();

    let tenants = Router::new()
        .nest("/tenants", handlers::tenants::routes())
        .nest("/platform", handlers::tenants::platform_routes())
        .with_role("superadmin");

    let store = Router::new()
        .nest("/catalog", handlers::catalog::routes().with_resource(resources::CATALOG))
        .nest("/products", handlers::products::routes().with_resource(resources::PRODUCTS))
        .nest("/inventory", handlers::inventory::routes().with_resource(resources::INVENTORY))
        .nest(
            "/purchase-orders",
            handlers::purchase_orders::routes().with_resource(resources::INVENTORY),
        )
        .nest("/audits", handlers::audits::routes().with_resource(resources::AUDITS))
        .nest("/sales", handlers::sales::routes().with_resource(resources::SALES))
        .nest("/customers", handlers::customers::routes().with_resource(resources::CUSTOMERS))
        .nest("/orders", handlers::orders::routes().with_resource(resources::ORDERS))
        .nest("/shop", handlers::shop::routes().with_resource(resources::SHOP))
        .nest("/vendors", handlers::vendors::routes().with_resource(resources::VENDORS))
        .nest("/invoices", handlers::invoices::routes().with_resource(resources::INVOICES))
        .nest("/campaigns", handlers::campaigns::routes().with_resource(resources::CAMPAIGNS))
        .nest("/expenses", handlers::expenses::routes().with_resource(resources::EXPENSES))
        .nest("/settings", handlers::settings::routes().with_resource(resources::SETTINGS))
        .nest("/reports", handlers::reports::routes().with_resource(resources::REPORTS))
        .nest("/pos-mappings", handlers::pos_mappings::routes().with_resource(resources::POS))
        .nest("/ai", handlers::ai::routes().with_resource(resources::AI))
        .nest("/supplier", handlers::supplier::routes().with_resource(resources::SUPPLIER));

    Router::new()
        .merge(public)
        .merge(me)
        .merge(tenants)
        .merge(store)
}

/// The API with request ids, HTTP tracing and the auth service wired in.
/// Deployment layers (CORS, compression, docs) are added by the binary.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(crate::tracing::configure_http_tracing())
        .layer(Extension(state.auth_service.clone()))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
