use axum::{
    extract::Path,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use uuid::Uuid;

use super::common::{created_response, deleted_response};
use crate::errors::ServiceError;
use crate::services::campaigns::{
    CampaignProductsRequest, CampaignRequest, CampaignService, CampaignView, PushToSaleRequest,
    PushedSale, SocialPost,
};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

fn service(store: &StoreDb) -> CampaignService {
    CampaignService::new(store.db.clone())
}

async fn list_campaigns(store: StoreDb) -> ApiResult<Vec<CampaignView>> {
    Ok(Json(ApiResponse::success(service(&store).list().await?)))
}

/// Campaigns running right now, for the storefront banner
async fn active_campaigns(store: StoreDb) -> ApiResult<Vec<CampaignView>> {
    Ok(Json(ApiResponse::success(
        service(&store).active(Utc::now()).await?,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/campaigns",
    summary = "Create campaign",
    request_body = CampaignRequest,
    responses(
        (status = 201, description = "Campaign created", body = ApiResponse<CampaignView>),
        (status = 400, description = "Missing title or bad dates", body = crate::errors::ErrorResponse),
        (status = 409, description = "Slug already taken", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "campaigns"
)]
pub async fn create_campaign(
    store: StoreDb,
    Json(request): Json<CampaignRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<CampaignView>>), ServiceError> {
    Ok(created_response(service(&store).create(request).await?))
}

async fn get_campaign(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<CampaignView> {
    Ok(Json(ApiResponse::success(service(&store).get(id).await?)))
}

async fn update_campaign(
    store: StoreDb,
    Path(id): Path<Uuid>,
    Json(request): Json<CampaignRequest>,
) -> ApiResult<CampaignView> {
    Ok(Json(ApiResponse::success(service(&store).update(id, request).await?)))
}

async fn delete_campaign(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<()> {
    service(&store).delete(id).await?;
    Ok(deleted_response())
}

async fn set_campaign_products(
    store: StoreDb,
    Path(id): Path<Uuid>,
    Json(request): Json<CampaignProductsRequest>,
) -> ApiResult<CampaignView> {
    let campaign = service(&store).set_products(id, request.product_ids).await?;
    Ok(Json(ApiResponse::success(campaign)))
}

#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/generate-post",
    summary = "Draft a social media post",
    params(("id" = Uuid, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Post text and hashtags", body = ApiResponse<SocialPost>),
        (status = 404, description = "Unknown campaign", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "campaigns"
)]
pub async fn generate_post(store: StoreDb, Path(id): Path<Uuid>) -> ApiResult<SocialPost> {
    Ok(Json(ApiResponse::success(service(&store).generate_post(id).await?)))
}

#[utoipa::path(
    post,
    path = "/api/v1/campaigns/push-to-sale",
    summary = "Put products on a flash sale",
    request_body = PushToSaleRequest,
    responses(
        (status = 201, description = "Flash sale created, with a drafted post for social channels", body = ApiResponse<PushedSale>),
        (status = 400, description = "No products or discount out of range", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "campaigns"
)]
pub async fn push_to_sale(
    store: StoreDb,
    Json(request): Json<PushToSaleRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<PushedSale>>), ServiceError> {
    Ok(created_response(service(&store).push_to_sale(request).await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_campaigns).post(create_campaign))
        .route("/active", get(active_campaigns))
        .route("/push-to-sale", post(push_to_sale))
        .route(
            "/:id",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/:id/products", put(set_campaign_products))
        .route("/:id/generate-post", post(generate_post))
}
