use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, put},
    Router,
};

use super::common::created_response;
use crate::entities::master::tenant;
use crate::errors::ServiceError;
use crate::services::tenants::{
    CreateTenantRequest, PlatformStats, ProvisionedTenant, TenantService,
    UpdateTenantStatusRequest,
};
use crate::{ApiResponse, ApiResult, AppState};

fn service(state: &AppState) -> TenantService {
    TenantService::new(state.tenants.clone())
}

#[utoipa::path(
    get,
    path = "/api/v1/tenants",
    summary = "List stores",
    responses(
        (status = 200, description = "Registered stores", body = ApiResponse<Vec<tenant::Model>>),
        (status = 403, description = "Platform operators only"),
    ),
    security(("Bearer" = [])),
    tag = "tenants"
)]
pub async fn list_tenants(State(state): State<AppState>) -> ApiResult<Vec<tenant::Model>> {
    Ok(Json(ApiResponse::success(service(&state).list_tenants().await?)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants",
    summary = "Register and provision a store",
    request_body = CreateTenantRequest,
    responses(
        (status = 201, description = "Store provisioned", body = ApiResponse<ProvisionedTenant>),
        (status = 400, description = "Invalid subdomain", body = crate::errors::ErrorResponse),
        (status = 409, description = "Subdomain taken", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "tenants"
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(request): Json<CreateTenantRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<ProvisionedTenant>>), ServiceError> {
    let provisioned = service(&state).create_tenant(request).await?;
    Ok(created_response(provisioned))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> ApiResult<tenant::Model> {
    Ok(Json(ApiResponse::success(service(&state).get_tenant(&subdomain).await?)))
}

pub async fn update_tenant_status(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
    Json(request): Json<UpdateTenantStatusRequest>,
) -> ApiResult<tenant::Model> {
    let updated = service(&state)
        .set_status(&subdomain, request.is_active)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{subdomain}",
    summary = "Deactivate a store",
    description = "Stores are deactivated rather than dropped; the database is kept for reactivation.",
    params(("subdomain" = String, Path, description = "Store subdomain")),
    responses(
        (status = 200, description = "Store deactivated", body = ApiResponse<tenant::Model>),
        (status = 404, description = "Unknown store", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "tenants"
)]
pub async fn deactivate_tenant(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> ApiResult<tenant::Model> {
    let tenant = service(&state).deactivate(&subdomain).await?;
    let message = format!("Store '{}' deactivated", tenant.subdomain);
    Ok(Json(ApiResponse::with_message(tenant, message)))
}

#[utoipa::path(
    get,
    path = "/api/v1/platform/stats",
    summary = "Platform counters",
    responses(
        (status = 200, description = "Store, account and catalog counts", body = ApiResponse<PlatformStats>),
        (status = 403, description = "Platform operators only"),
    ),
    security(("Bearer" = [])),
    tag = "tenants"
)]
pub async fn platform_stats(State(state): State<AppState>) -> ApiResult<PlatformStats> {
    Ok(Json(ApiResponse::success(service(&state).stats().await?)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tenants).post(create_tenant))
        .route("/:subdomain", get(get_tenant).delete(deactivate_tenant))
        .route("/:subdomain/status", put(update_tenant_status))
}

pub fn platform_routes() -> Router<AppState> {
    Router::new().route("/stats", get(platform_stats))
}
