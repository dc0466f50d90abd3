use axum::{
    extract::Path,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use uuid::Uuid;

use super::common::deleted_response;
use crate::entities::tenant::pos_mapping;
use crate::services::pos_mappings::{
    PosMappingService, UpsertPosMappingRequest, VerifyPosMappingRequest,
};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

fn service(store: &StoreDb) -> PosMappingService {
    PosMappingService::new(store.db.clone())
}

async fn list_mappings(store: StoreDb) -> ApiResult<Vec<pos_mapping::Model>> {
    Ok(Json(ApiResponse::success(service(&store).list().await?)))
}

/// Creates the mapping or replaces the one with the same POS code
async fn upsert_mapping(
    store: StoreDb,
    Json(request): Json<UpsertPosMappingRequest>,
) -> ApiResult<pos_mapping::Model> {
    Ok(Json(ApiResponse::success(service(&store).upsert(request).await?)))
}

async fn verify_mapping(
    store: StoreDb,
    Path(id): Path<Uuid>,
    body: Option<Json<VerifyPosMappingRequest>>,
) -> ApiResult<pos_mapping::Model> {
    let product_id = body.and_then(|Json(b)| b.product_id);
    Ok(Json(ApiResponse::success(
        service(&store).verify(id, product_id).await?,
    )))
}

async fn delete_mapping(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<()> {
    service(&store).delete(id).await?;
    Ok(deleted_response())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_mappings).post(upsert_mapping))
        .route("/:id/verify", post(verify_mapping))
        .route("/:id", delete(delete_mapping))
}
