use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};

use crate::errors::ServiceError;
use crate::tenancy::StoreDb;
use crate::services::supplier_quotes::{
    estimate, EstimateRequest, QuoteEstimate, SendQuoteRequest, SupplierOrder,
};
use crate::{ApiResponse, ApiResult, AppState};

pub async fn list_orders(
    State(state): State<AppState>,
    store: StoreDb,
) -> ApiResult<Vec<SupplierOrder>> {
    let book = state.quotes.for_store(&store.subdomain);
    Ok(Json(ApiResponse::success(book.list_orders().await)))
}

pub async fn get_order(
    State(state): State<AppState>,
    store: StoreDb,
    Path(id): Path<String>,
) -> ApiResult<SupplierOrder> {
    let book = state.quotes.for_store(&store.subdomain);
    Ok(Json(ApiResponse::success(book.get_order(&id).await?)))
}

#[utoipa::path(
    post,
    path = "/api/v1/supplier/orders/{id}/quote",
    summary = "Send a revised quote",
    description = "Replaces the order lines and terms and records a new quote version",
    params(("id" = String, Path, description = "Supplier order id")),
    request_body = SendQuoteRequest,
    responses(
        (status = 200, description = "Order with the new quote version on top", body = ApiResponse<SupplierOrder>),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "supplier"
)]
pub async fn send_quote(
    State(state): State<AppState>,
    store: StoreDb,
    Path(id): Path<String>,
    Json(request): Json<SendQuoteRequest>,
) -> ApiResult<SupplierOrder> {
    let order = state
        .quotes
        .for_store(&store.subdomain)
        .send_quote(&id, request)
        .await?;
    Ok(Json(ApiResponse::with_message(order, "Quote sent")))
}

pub async fn confirm_order(
    State(state): State<AppState>,
    store: StoreDb,
    Path(id): Path<String>,
) -> ApiResult<SupplierOrder> {
    let book = state.quotes.for_store(&store.subdomain);
    Ok(Json(ApiResponse::success(book.confirm_order(&id).await?)))
}

pub async fn export_order(
    State(state): State<AppState>,
    store: StoreDb,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let csv = state.quotes.for_store(&store.subdomain).export_csv(&id).await?;
    let disposition = format!("attachment; filename=\"{}.csv\"", id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/supplier/quotes/estimate",
    summary = "Price a draft quote",
    request_body = EstimateRequest,
    responses(
        (status = 200, description = "Totals and logistics", body = ApiResponse<QuoteEstimate>),
        (status = 400, description = "Amounts overflow", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "supplier"
)]
pub async fn estimate_quote(
    _store: StoreDb,
    Json(request): Json<EstimateRequest>,
) -> ApiResult<QuoteEstimate> {
    Ok(Json(ApiResponse::success(estimate(&request.items, request.shipping)?)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/quote", post(send_quote))
        .route("/orders/:id/confirm", post(confirm_order))
        .route("/orders/:id/export", get(export_order))
        .route("/quotes/estimate", post(estimate_quote))
}
