use axum::{
    extract::Query,
    response::Json,
    routing::{get, post},
    Router,
};

use super::common::created_response;
use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::orders::OrderDetail;
use crate::services::shop::{
    CategoryCount, CheckoutRequest, ShopProduct, ShopQuery, ShopService, Shopper,
};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

fn service(store: &StoreDb) -> ShopService {
    ShopService::new(store.db.clone())
}

#[utoipa::path(
    get,
    path = "/api/v1/shop/products",
    summary = "Browse the storefront",
    params(ShopQuery),
    responses((status = 200, description = "Active products, in stock unless in_stock_only=false", body = ApiResponse<Vec<ShopProduct>>)),
    security(("Bearer" = [])),
    tag = "shop"
)]
pub async fn shop_products(
    store: StoreDb,
    Query(query): Query<ShopQuery>,
) -> ApiResult<Vec<ShopProduct>> {
    Ok(Json(ApiResponse::success(service(&store).products(&query).await?)))
}

#[utoipa::path(
    get,
    path = "/api/v1/shop/categories",
    summary = "Storefront categories",
    responses((status = 200, description = "Categories with products on the shelf", body = ApiResponse<Vec<CategoryCount>>)),
    security(("Bearer" = [])),
    tag = "shop"
)]
pub async fn shop_categories(store: StoreDb) -> ApiResult<Vec<CategoryCount>> {
    Ok(Json(ApiResponse::success(service(&store).categories().await?)))
}

#[utoipa::path(
    post,
    path = "/api/v1/shop/checkout",
    summary = "Place an online order",
    description = "Creates a processing order for the signed-in shopper and takes the units off the shelf.",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Empty cart", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "shop"
)]
pub async fn checkout(
    store: StoreDb,
    user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<OrderDetail>>), ServiceError> {
    let shopper = Shopper {
        name: user.name,
        email: user.email,
    };
    Ok(created_response(service(&store).checkout(&shopper, request).await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(shop_products))
        .route("/categories", get(shop_categories))
        .route("/checkout", post(checkout))
}
