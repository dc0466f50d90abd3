use axum::{
    extract::{Path, Query},
    response::Json,
    routing::get,
    Router,
};
use uuid::Uuid;

use super::common::{created_response, deleted_response, SearchParams};
use crate::entities::tenant::customer;
use crate::errors::ServiceError;
use crate::services::customers::{CreateCustomerRequest, CustomerService, UpdateCustomerRequest};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

fn service(store: &StoreDb) -> CustomerService {
    CustomerService::new(store.db.clone())
}

async fn list_customers(store: StoreDb) -> ApiResult<Vec<customer::Model>> {
    Ok(Json(ApiResponse::success(service(&store).list().await?)))
}

async fn search_customers(
    store: StoreDb,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<customer::Model>> {
    Ok(Json(ApiResponse::success(service(&store).search(&params.q).await?)))
}

async fn create_customer(
    store: StoreDb,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<customer::Model>>), ServiceError> {
    Ok(created_response(service(&store).create(request).await?))
}

async fn get_customer(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<customer::Model> {
    Ok(Json(ApiResponse::success(service(&store).get(id).await?)))
}

async fn update_customer(
    store: StoreDb,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCustomerRequest>,
) -> ApiResult<customer::Model> {
    Ok(Json(ApiResponse::success(service(&store).update(id, request).await?)))
}

async fn delete_customer(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<()> {
    service(&store).delete(id).await?;
    Ok(deleted_response())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route("/search", get(search_customers))
        .route(
            "/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
}
