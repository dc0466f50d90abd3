use axum::{
    extract::{Path, Query},
    response::Json,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{created_response, LimitParams};
use crate::auth::AuthUser;
use crate::entities::tenant::shelf_audit;
use crate::errors::ServiceError;
use crate::services::audits::{
    AuditDetail, AuditHistoryEntry, AuditService, AuditStarted, AuditSummary, CompleteAuditRequest,
};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

fn service(store: &StoreDb) -> AuditService {
    AuditService::new(store.db.clone())
}

#[utoipa::path(
    post,
    path = "/api/v1/audits/start",
    summary = "Start a shelf audit",
    responses((status = 201, description = "Audit opened", body = ApiResponse<AuditStarted>)),
    security(("Bearer" = [])),
    tag = "audits"
)]
pub async fn start_audit(
    store: StoreDb,
    user: AuthUser,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<AuditStarted>>), ServiceError> {
    let auditor = Uuid::parse_str(&user.user_id).ok();
    Ok(created_response(service(&store).start(auditor).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/audits/{id}/complete",
    summary = "Submit shelf counts",
    description = "Compares each count with recorded stock. Differences are booked unless auto_adjust is false, in which case the audit waits for apply or reject.",
    params(("id" = Uuid, Path, description = "Audit id")),
    request_body = CompleteAuditRequest,
    responses(
        (status = 200, description = "Reconciliation summary", body = ApiResponse<AuditSummary>),
        (status = 404, description = "Unknown audit or product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Audit already completed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "audits"
)]
pub async fn complete_audit(
    store: StoreDb,
    Path(id): Path<Uuid>,
    Json(request): Json<CompleteAuditRequest>,
) -> ApiResult<AuditSummary> {
    Ok(Json(ApiResponse::success(service(&store).complete(id, request).await?)))
}

async fn audit_history(
    store: StoreDb,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<AuditHistoryEntry>> {
    Ok(Json(ApiResponse::success(service(&store).history(params.limit).await?)))
}

#[utoipa::path(
    get,
    path = "/api/v1/audits/{id}",
    summary = "Audit report",
    params(("id" = Uuid, Path, description = "Audit id")),
    responses(
        (status = 200, description = "Per-product differences with loss and gain totals", body = ApiResponse<AuditDetail>),
        (status = 404, description = "Unknown audit", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "audits"
)]
pub async fn get_audit(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<AuditDetail> {
    Ok(Json(ApiResponse::success(service(&store).details(id).await?)))
}

async fn apply_audit(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<AuditSummary> {
    let summary = service(&store).apply(id).await?;
    Ok(Json(ApiResponse::with_message(summary, "Audit applied")))
}

async fn reject_audit(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<shelf_audit::Model> {
    let audit = service(&store).reject(id).await?;
    Ok(Json(ApiResponse::with_message(audit, "Audit rejected")))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_audit))
        .route("/history", get(audit_history))
        .route("/:id", get(get_audit))
        .route("/:id/complete", post(complete_audit))
        .route("/:id/apply", post(apply_audit))
        .route("/:id/reject", post(reject_audit))
}
