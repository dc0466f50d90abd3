use axum::{extract::Path, response::Json, routing::get, Router};
use uuid::Uuid;

use crate::entities::tenant::purchase_order;
use crate::services::purchase_orders::{PurchaseOrderDetail, PurchaseOrderService};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

pub async fn list_purchase_orders(store: StoreDb) -> ApiResult<Vec<purchase_order::Model>> {
    let orders = PurchaseOrderService::new(store.db.clone()).list().await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    summary = "Get purchase order",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Purchase order with vendor and lines", body = ApiResponse<PurchaseOrderDetail>),
        (status = 404, description = "Unknown purchase order", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "purchase-orders"
)]
pub async fn get_purchase_order(
    store: StoreDb,
    Path(id): Path<Uuid>,
) -> ApiResult<PurchaseOrderDetail> {
    let order = PurchaseOrderService::new(store.db.clone()).get(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_purchase_orders))
        .route("/:id", get(get_purchase_order))
}
