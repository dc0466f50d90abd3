use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created_response, LimitParams};
use crate::auth::AuthUser;
use crate::entities::tenant::sale;
use crate::errors::ServiceError;
use crate::integrations::ImageUpload;
use crate::services::sales::{
    CreateSaleRequest, DailySummary, ProcessSalesRequest, ProcessSalesResult, SaleDetail,
    SaleService, ZReportResult,
};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DailySummaryParams {
    /// Defaults to today (UTC)
    pub date: Option<NaiveDate>,
}

fn service(store: &StoreDb) -> SaleService {
    SaleService::new(store.db.clone())
}

#[utoipa::path(
    post,
    path = "/api/v1/sales",
    summary = "Ring up a sale",
    description = "Records the sale, decrements stock and writes SALE movements in one transaction",
    request_body = CreateSaleRequest,
    responses(
        (status = 201, description = "Sale recorded", body = ApiResponse<SaleDetail>),
        (status = 400, description = "Invalid lines or underpayment", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "sales"
)]
pub async fn create_sale(
    store: StoreDb,
    user: AuthUser,
    Json(request): Json<CreateSaleRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<SaleDetail>>), ServiceError> {
    let sale = service(&store).create_sale(request, user.user_uuid()).await?;
    Ok(created_response(sale))
}

pub async fn list_sales(
    store: StoreDb,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<sale::Model>> {
    Ok(Json(ApiResponse::success(service(&store).list(params.limit).await?)))
}

pub async fn get_sale(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<SaleDetail> {
    Ok(Json(ApiResponse::success(service(&store).get(id).await?)))
}

pub async fn cancel_sale(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<SaleDetail> {
    let sale = service(&store).cancel_sale(id).await?;
    Ok(Json(ApiResponse::with_message(sale, "Sale cancelled and stock restored")))
}

pub async fn daily_summary(
    store: StoreDb,
    Query(params): Query<DailySummaryParams>,
) -> ApiResult<DailySummary> {
    let date = params.date.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(ApiResponse::success(service(&store).daily_summary(date).await?)))
}

#[utoipa::path(
    post,
    path = "/api/v1/sales/process",
    summary = "Apply POS sales",
    description = "Deducts sold quantities; items without enough stock are skipped",
    request_body = ProcessSalesRequest,
    responses((status = 200, description = "Sync result", body = ApiResponse<ProcessSalesResult>)),
    security(("Bearer" = [])),
    tag = "sales"
)]
pub async fn process_sales(
    store: StoreDb,
    Json(request): Json<ProcessSalesRequest>,
) -> ApiResult<ProcessSalesResult> {
    Ok(Json(ApiResponse::success(
        service(&store).process_sales(&request.items).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/sales/z-report",
    summary = "Apply a Z-report photo",
    request_body = ImageUpload,
    responses(
        (status = 200, description = "Lines read and applied", body = ApiResponse<ZReportResult>),
        (status = 400, description = "AI not configured or bad image", body = crate::errors::ErrorResponse),
        (status = 502, description = "Vision provider failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "sales"
)]
pub async fn process_z_report(
    State(state): State<AppState>,
    store: StoreDb,
    Json(upload): Json<ImageUpload>,
) -> ApiResult<ZReportResult> {
    let result = service(&store)
        .process_z_report(state.ai.as_ref(), &upload)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sales).post(create_sale))
        .route("/daily-summary", get(daily_summary))
        .route("/process", post(process_sales))
        .route("/z-report", post(process_z_report))
        .route("/:id", get(get_sale))
        .route("/:id/cancel", post(cancel_sale))
}
