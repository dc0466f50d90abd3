use axum::{
    extract::Query,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::common::created_response;
use crate::errors::ServiceError;
use crate::services::inventory::{
    AutoRestockRequest, AutoRestockResult, GeneratePurchaseOrderRequest, InventoryHealth,
    InventoryService, RestockRecommendation, StockLevel,
};
use crate::services::purchase_orders::PurchaseOrderDetail;
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct StockLevelParams {
    /// Only products at or below their reorder level
    #[serde(default)]
    pub critical_only: bool,
}

fn service(store: &StoreDb) -> InventoryService {
    InventoryService::new(store.db.clone())
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/health",
    summary = "Inventory health",
    description = "Stock counts, inventory value and a 0-100 health score",
    responses(
        (status = 200, description = "Health snapshot", body = ApiResponse<InventoryHealth>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn inventory_health(store: StoreDb) -> ApiResult<InventoryHealth> {
    Ok(Json(ApiResponse::success(service(&store).health().await?)))
}

pub async fn stock_levels(
    store: StoreDb,
    Query(params): Query<StockLevelParams>,
) -> ApiResult<Vec<StockLevel>> {
    let levels = service(&store).stock_levels(params.critical_only).await?;
    Ok(Json(ApiResponse::success(levels)))
}

pub async fn restock_recommendations(store: StoreDb) -> ApiResult<Vec<RestockRecommendation>> {
    Ok(Json(ApiResponse::success(
        service(&store).restock_recommendations().await?,
    )))
}

pub async fn generate_purchase_order(
    store: StoreDb,
    Json(request): Json<GeneratePurchaseOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<PurchaseOrderDetail>>), ServiceError> {
    let po = service(&store).generate_purchase_order(request).await?;
    Ok(created_response(po))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/restock/auto",
    summary = "Auto restock",
    description = "Drafts one purchase order covering every product at or below its reorder level",
    request_body = AutoRestockRequest,
    responses(
        (status = 200, description = "Draft purchase order, or nothing to restock", body = ApiResponse<AutoRestockResult>),
        (status = 404, description = "No vendor available", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn auto_restock(
    store: StoreDb,
    request: Option<Json<AutoRestockRequest>>,
) -> ApiResult<AutoRestockResult> {
    let vendor_id = request.and_then(|Json(r)| r.vendor_id);
    Ok(Json(ApiResponse::success(
        service(&store).auto_restock(vendor_id).await?,
    )))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(inventory_health))
        .route("/stock-levels", get(stock_levels))
        .route("/restock/recommendations", get(restock_recommendations))
        .route("/restock/generate-po", post(generate_purchase_order))
        .route("/restock/auto", post(auto_restock))
}
