use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created_response, SearchParams};
use crate::auth::AuthUser;
use crate::entities::master::global_product;
use crate::errors::ServiceError;
use crate::services::catalog::{CatalogMatch, CatalogService, CreateCatalogProductRequest};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CatalogListParams {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn service(state: &AppState) -> CatalogService {
    CatalogService::new(state.master_db.clone())
}

pub async fn list_catalog(
    State(state): State<AppState>,
    Query(params): Query<CatalogListParams>,
) -> ApiResult<Vec<global_product::Model>> {
    let products = service(&state).list(params.limit, params.offset).await?;
    Ok(Json(ApiResponse::success(products)))
}

pub async fn get_catalog_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<global_product::Model> {
    Ok(Json(ApiResponse::success(service(&state).get(id).await?)))
}

/// Operator submissions are live immediately; store submissions wait for review.
pub async fn create_catalog_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateCatalogProductRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<global_product::Model>>), ServiceError> {
    let created = service(&state)
        .create(request, user.is_platform_operator())
        .await?;
    Ok(created_response(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/catalog/search",
    summary = "Search the shared catalog",
    params(SearchParams),
    responses(
        (status = 200, description = "Ranked matches", body = ApiResponse<Vec<CatalogMatch>>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn search_catalog(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<CatalogMatch>> {
    let matches = service(&state).search(&params.q, params.limit).await?;
    Ok(Json(ApiResponse::success(matches)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_catalog).post(create_catalog_product))
        .route("/products/:id", get(get_catalog_product))
        .route("/search", get(search_catalog))
}
