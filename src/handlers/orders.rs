use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::created_response;
use crate::entities::tenant::order;
use crate::errors::ServiceError;
use crate::services::orders::{
    CreateOrderRequest, OrderDetail, OrderPaymentIntent, OrderService, UpdateStatusRequest,
};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct OrderListParams {
    /// pending, processing, completed or cancelled
    pub status: Option<String>,
}

fn service(store: &StoreDb) -> OrderService {
    OrderService::new(store.db.clone())
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    params(OrderListParams),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<Vec<order::Model>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    store: StoreDb,
    Query(params): Query<OrderListParams>,
) -> ApiResult<Vec<order::Model>> {
    let orders = service(&store).list(params.status.as_deref()).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product or customer", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    store: StoreDb,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<OrderDetail>>), ServiceError> {
    Ok(created_response(service(&store).create(request).await?))
}

pub async fn get_order(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<OrderDetail> {
    Ok(Json(ApiResponse::success(service(&store).get(id).await?)))
}

pub async fn update_order_status(
    store: StoreDb,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<order::Model> {
    let order = service(&store).update_status(id, &request.status).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn update_payment_status(
    store: StoreDb,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<order::Model> {
    let order = service(&store)
        .update_payment_status(id, &request.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment-intent",
    summary = "Create a Stripe payment intent",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Payment intent created", body = ApiResponse<OrderPaymentIntent>),
        (status = 400, description = "Payments not configured for this store", body = crate::errors::ErrorResponse),
        (status = 502, description = "Stripe rejected the request", body = crate::errors::ErrorResponse),
        (status = 503, description = "Stripe circuit open", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    store: StoreDb,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderPaymentIntent> {
    let intent = service(&store)
        .create_payment_intent(id, &state.stripe)
        .await?;
    Ok(Json(ApiResponse::success(intent)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_order_status))
        .route("/:id/payment-status", put(update_payment_status))
        .route("/:id/payment-intent", post(create_payment_intent))
}
