use axum::{
    extract::{Path, Query},
    response::Json,
    routing::get,
    Router,
};
use uuid::Uuid;

use super::common::{created_response, deleted_response, SearchParams};
use crate::entities::tenant::vendor;
use crate::errors::ServiceError;
use crate::services::vendors::{VendorRequest, VendorService};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

fn service(store: &StoreDb) -> VendorService {
    VendorService::new(store.db.clone())
}

async fn list_vendors(store: StoreDb) -> ApiResult<Vec<vendor::Model>> {
    Ok(Json(ApiResponse::success(service(&store).list().await?)))
}

async fn search_vendors(
    store: StoreDb,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<vendor::Model>> {
    Ok(Json(ApiResponse::success(service(&store).search(&params.q).await?)))
}

async fn create_vendor(
    store: StoreDb,
    Json(request): Json<VendorRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<vendor::Model>>), ServiceError> {
    Ok(created_response(service(&store).create(request).await?))
}

async fn get_vendor(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<vendor::Model> {
    Ok(Json(ApiResponse::success(service(&store).get(id).await?)))
}

async fn update_vendor(
    store: StoreDb,
    Path(id): Path<Uuid>,
    Json(request): Json<VendorRequest>,
) -> ApiResult<vendor::Model> {
    Ok(Json(ApiResponse::success(service(&store).update(id, request).await?)))
}

async fn delete_vendor(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<()> {
    service(&store).delete(id).await?;
    Ok(deleted_response())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_vendors).post(create_vendor))
        .route("/search", get(search_vendors))
        .route("/:id", get(get_vendor).put(update_vendor).delete(delete_vendor))
}
