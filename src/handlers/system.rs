use axum::{extract::State, routing::get, Router};
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::services::settings::{SettingsService, StoreSettingsView};
use crate::tenancy::TenantDb;
use crate::{db, ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct StoreInfo {
    pub subdomain: String,
    pub is_platform: bool,
    pub store_name: String,
    pub is_active: bool,
    /// Store settings; absent for the platform database
    pub settings: Option<StoreSettingsView>,
}

#[utoipa::path(
    get,
    path = "/api/v1/status",
    summary = "Service status",
    responses((status = 200, description = "Service is up", body = ApiResponse<Value>)),
    tag = "system"
)]
pub async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(axum::Json(ApiResponse::success(json!({
        "status": "ok",
        "service": "retailos-api",
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
        "built": option_env!("BUILD_TIME").unwrap_or("unknown"),
        "environment": state.config.environment,
        "ai_enabled": state.ai.is_enabled(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))))
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    summary = "Health check",
    responses((status = 200, description = "Dependency health", body = ApiResponse<Value>)),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.master_db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    Ok(axum::Json(ApiResponse::success(json!({
        "status": db_status,
        "checks": {
            "database": db_status,
            "store_connections": state.tenants.cached_connections(),
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))))
}

/// Describes the store addressed by the request
#[utoipa::path(
    get,
    path = "/api/v1/store",
    summary = "Current store",
    params(("X-Subdomain" = String, Header, description = "Store subdomain")),
    responses(
        (status = 200, description = "Resolved store", body = ApiResponse<StoreInfo>),
        (status = 400, description = "No subdomain given", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown store", body = crate::errors::ErrorResponse),
    ),
    tag = "system"
)]
pub async fn current_store(tenant: TenantDb) -> ApiResult<StoreInfo> {
    let info = match &tenant.tenant {
        None => StoreInfo {
            subdomain: tenant.subdomain.clone(),
            is_platform: true,
            store_name: "RetailOS Platform".to_string(),
            is_active: true,
            settings: None,
        },
        Some(row) => StoreInfo {
            subdomain: row.subdomain.clone(),
            is_platform: false,
            store_name: row.store_name.clone(),
            is_active: row.is_active,
            settings: Some(SettingsService::new(tenant.db.clone()).store().await?),
        },
    };
    Ok(axum::Json(ApiResponse::success(info)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .route("/store", get(current_store))
}
