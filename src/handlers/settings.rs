use axum::{response::Json, routing::get, Router};

use crate::services::settings::{
    PaymentSettingsView, SettingsService, StoreSettingsView, UpdatePaymentSettingsRequest,
    UpdateStoreSettingsRequest,
};
use crate::tenancy::StoreDb;
use crate::{ApiResponse, ApiResult, AppState};

fn service(store: &StoreDb) -> SettingsService {
    SettingsService::new(store.db.clone())
}

pub async fn get_store_settings(store: StoreDb) -> ApiResult<StoreSettingsView> {
    Ok(Json(ApiResponse::success(service(&store).store().await?)))
}

#[utoipa::path(
    put,
    path = "/api/v1/settings/store",
    summary = "Update store settings",
    request_body = UpdateStoreSettingsRequest,
    responses(
        (status = 200, description = "Settings saved", body = ApiResponse<StoreSettingsView>),
        (status = 400, description = "Invalid settings", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "settings"
)]
pub async fn update_store_settings(
    store: StoreDb,
    Json(request): Json<UpdateStoreSettingsRequest>,
) -> ApiResult<StoreSettingsView> {
    let settings = service(&store).update_store(request).await?;
    Ok(Json(ApiResponse::with_message(settings, "Settings saved")))
}

pub async fn get_payment_settings(store: StoreDb) -> ApiResult<PaymentSettingsView> {
    Ok(Json(ApiResponse::success(service(&store).payment().await?)))
}

pub async fn update_payment_settings(
    store: StoreDb,
    Json(request): Json<UpdatePaymentSettingsRequest>,
) -> ApiResult<PaymentSettingsView> {
    let settings = service(&store).update_payment(request).await?;
    Ok(Json(ApiResponse::with_message(settings, "Payment settings saved")))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/store", get(get_store_settings).put(update_store_settings))
        .route(
            "/payment",
            get(get_payment_settings).put(update_payment_settings),
        )
}
