use axum::{extract::Query, response::Json, routing::get, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::services::reports::{DailyProfit, ProfitReport, ReportService, TopProduct, Trends};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SummaryParams {
    /// Trailing window in days, 1 to 365
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DailyParams {
    /// Number of days to break down, 1 to 90
    pub days_back: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TopProductsParams {
    pub limit: Option<usize>,
}

fn service(store: &StoreDb) -> ReportService {
    ReportService::new(store.db.clone())
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/profits/summary",
    summary = "Profit and loss for a trailing window",
    params(SummaryParams),
    responses(
        (status = 200, description = "Revenue, COGS, expenses and margins", body = ApiResponse<ProfitReport>),
        (status = 400, description = "Window out of range", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "reports"
)]
pub async fn profit_summary(
    store: StoreDb,
    Query(params): Query<SummaryParams>,
) -> ApiResult<ProfitReport> {
    Ok(Json(ApiResponse::success(service(&store).summary(params.days).await?)))
}

pub async fn daily_profits(
    store: StoreDb,
    Query(params): Query<DailyParams>,
) -> ApiResult<Vec<DailyProfit>> {
    Ok(Json(ApiResponse::success(
        service(&store).daily(params.days_back).await?,
    )))
}

pub async fn profit_trends(store: StoreDb) -> ApiResult<Trends> {
    Ok(Json(ApiResponse::success(service(&store).trends().await?)))
}

pub async fn top_products(
    store: StoreDb,
    Query(params): Query<TopProductsParams>,
) -> ApiResult<Vec<TopProduct>> {
    Ok(Json(ApiResponse::success(
        service(&store).top_products(params.limit).await?,
    )))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/profits/summary", get(profit_summary))
        .route("/profits/daily", get(daily_profits))
        .route("/profits/trends", get(profit_trends))
        .route("/profits/top-products", get(top_products))
}
