use axum::{http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use crate::ApiResponse;

/// `201 Created` with the standard envelope
pub fn created_response<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

/// Confirmation body for deletes
pub fn deleted_response() -> Json<ApiResponse<()>> {
    Json(ApiResponse::with_message((), "Deleted"))
}

/// `?q=` for the search endpoints
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u64>,
}

/// `?limit=` for history style listings
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LimitParams {
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_uses_201() {
        let (status, Json(body)) = created_response("x");
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.success);
    }

    #[test]
    fn search_params_default_to_empty_query() {
        let params: SearchParams = serde_json::from_str("{}").unwrap();
        assert!(params.q.is_empty());
        assert!(params.limit.is_none());
    }
}
