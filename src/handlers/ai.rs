use axum::{extract::State, response::Json, routing::post, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DescriptionRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub category: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DescriptionResponse {
    pub description: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ImageRequest {
    #[validate(length(min = 1, max = 1000))]
    pub prompt: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageResponse {
    pub image_url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/ai/product-description",
    summary = "Write a product description",
    request_body = DescriptionRequest,
    responses(
        (status = 200, description = "Generated copy", body = ApiResponse<DescriptionResponse>),
        (status = 400, description = "AI not configured", body = crate::errors::ErrorResponse),
        (status = 502, description = "Provider failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "ai"
)]
pub async fn product_description(
    State(state): State<AppState>,
    _store: StoreDb,
    Json(request): Json<DescriptionRequest>,
) -> ApiResult<DescriptionResponse> {
    request.validate()?;
    let description = state
        .ai
        .generate_product_description(&request.name, request.category.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(DescriptionResponse { description })))
}

pub async fn product_image(
    State(state): State<AppState>,
    _store: StoreDb,
    Json(request): Json<ImageRequest>,
) -> ApiResult<ImageResponse> {
    request.validate()?;
    let image_url = state.ai.generate_product_image(&request.prompt).await?;
    Ok(Json(ApiResponse::success(ImageResponse { image_url })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/product-description", post(product_description))
        .route("/product-image", post(product_image))
}
