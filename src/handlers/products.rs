use axum::{
    extract::{Path, Query},
    response::Json,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{created_response, deleted_response};
use crate::entities::tenant::product;
use crate::errors::ServiceError;
use crate::services::products::{
    AdjustStockRequest, CreateProductRequest, ProductQuery, ProductService, UpdateProductRequest,
};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

fn service(store: &StoreDb) -> ProductService {
    ProductService::new(store.db.clone())
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    summary = "List products",
    description = "Paginated store products with optional name search and category filter",
    params(ProductQuery),
    responses(
        (status = 200, description = "A page of products", body = ApiResponse<PaginatedResponse<product::Model>>),
        (status = 400, description = "No store subdomain", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn list_products(
    store: StoreDb,
    Query(query): Query<ProductQuery>,
) -> ApiResult<PaginatedResponse<product::Model>> {
    let page = service(&store).list(query).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        page.items,
        page.total,
        page.page,
        page.per_page,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    summary = "Create product",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<product::Model>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already used", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn create_product(
    store: StoreDb,
    Json(request): Json<CreateProductRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<product::Model>>), ServiceError> {
    let created = service(&store).create(request).await?;
    Ok(created_response(created))
}

pub async fn get_product(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<product::Model> {
    Ok(Json(ApiResponse::success(service(&store).get(id).await?)))
}

pub async fn update_product(
    store: StoreDb,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProductRequest>,
) -> ApiResult<product::Model> {
    Ok(Json(ApiResponse::success(service(&store).update(id, request).await?)))
}

pub async fn delete_product(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<()> {
    service(&store).delete(id).await?;
    Ok(deleted_response())
}

pub async fn low_stock(store: StoreDb) -> ApiResult<Vec<product::Model>> {
    Ok(Json(ApiResponse::success(service(&store).low_stock().await?)))
}

#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/adjust-stock",
    summary = "Adjust stock",
    description = "Applies a signed stock change and records an ADJUSTMENT movement",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Updated product", body = ApiResponse<product::Model>),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
        (status = 422, description = "Stock would go negative", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn adjust_stock(
    store: StoreDb,
    Path(id): Path<Uuid>,
    Json(request): Json<AdjustStockRequest>,
) -> ApiResult<product::Model> {
    Ok(Json(ApiResponse::success(
        service(&store).adjust_stock(id, request).await?,
    )))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/low-stock", get(low_stock))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/:id/adjust-stock", post(adjust_stock))
}
