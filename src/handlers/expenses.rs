use axum::{
    extract::{Path, Query},
    response::Json,
    routing::get,
    Router,
};
use uuid::Uuid;

use super::common::{created_response, deleted_response};
use crate::entities::tenant::expense;
use crate::errors::ServiceError;
use crate::services::expenses::{
    CreateExpenseRequest, ExpenseFilter, ExpenseService, UpdateExpenseRequest,
};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

fn service(store: &StoreDb) -> ExpenseService {
    ExpenseService::new(store.db.clone())
}

#[utoipa::path(
    get,
    path = "/api/v1/expenses",
    summary = "List expenses",
    params(ExpenseFilter),
    responses((status = 200, description = "Expenses, newest first", body = ApiResponse<Vec<expense::Model>>)),
    security(("Bearer" = [])),
    tag = "expenses"
)]
pub async fn list_expenses(
    store: StoreDb,
    Query(filter): Query<ExpenseFilter>,
) -> ApiResult<Vec<expense::Model>> {
    Ok(Json(ApiResponse::success(service(&store).list(filter).await?)))
}

pub async fn expense_categories(store: StoreDb) -> ApiResult<Vec<String>> {
    Ok(Json(ApiResponse::success(service(&store).categories().await?)))
}

pub async fn create_expense(
    store: StoreDb,
    Json(request): Json<CreateExpenseRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<expense::Model>>), ServiceError> {
    Ok(created_response(service(&store).create(request).await?))
}

pub async fn get_expense(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<expense::Model> {
    Ok(Json(ApiResponse::success(service(&store).get(id).await?)))
}

pub async fn update_expense(
    store: StoreDb,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateExpenseRequest>,
) -> ApiResult<expense::Model> {
    Ok(Json(ApiResponse::success(service(&store).update(id, request).await?)))
}

pub async fn delete_expense(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<()> {
    service(&store).delete(id).await?;
    Ok(deleted_response())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_expenses).post(create_expense))
        .route("/categories", get(expense_categories))
        .route(
            "/:id",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
}
