use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{created_response, LimitParams};
use crate::errors::ServiceError;
use crate::integrations::ai::{ImageUpload, ParsedInvoice};
use crate::services::invoices::{CommitResult, InvoiceDetail, InvoiceService};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

fn service(store: &StoreDb) -> InvoiceService {
    InvoiceService::new(store.db.clone())
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/parse",
    summary = "Read a supplier invoice photo",
    description = "Extracts vendor and line items and suggests a matching store product per line. Nothing is saved.",
    request_body = ImageUpload,
    responses(
        (status = 200, description = "Parsed invoice for review", body = ApiResponse<ParsedInvoice>),
        (status = 400, description = "AI not configured or bad image", body = crate::errors::ErrorResponse),
        (status = 502, description = "Vision provider failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn parse_invoice(
    State(state): State<AppState>,
    store: StoreDb,
    Json(upload): Json<ImageUpload>,
) -> ApiResult<ParsedInvoice> {
    let parsed = service(&store).parse(state.ai.as_ref(), &upload).await?;
    Ok(Json(ApiResponse::success(parsed)))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/commit",
    summary = "Commit a reviewed invoice",
    description = "Saves the invoice, receives stock for every line and creates unknown products and vendors",
    request_body = ParsedInvoice,
    responses(
        (status = 201, description = "Invoice committed", body = ApiResponse<CommitResult>),
        (status = 400, description = "Invalid invoice", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "invoices"
)]
pub async fn commit_invoice(
    store: StoreDb,
    Json(payload): Json<ParsedInvoice>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<CommitResult>>), ServiceError> {
    let result = service(&store).commit(payload).await?;
    Ok(created_response(result))
}

pub async fn invoice_history(
    store: StoreDb,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<InvoiceDetail>> {
    Ok(Json(ApiResponse::success(service(&store).history(params.limit).await?)))
}

pub async fn get_invoice(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<InvoiceDetail> {
    Ok(Json(ApiResponse::success(service(&store).get(id).await?)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(invoice_history))
        .route("/parse", post(parse_invoice))
        .route("/commit", post(commit_invoice))
        .route("/:id", get(get_invoice))
}
