use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::created_response;
use crate::auth::{extract_auth_from_headers, AuthUser, TokenPair};
use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;
use crate::services::users::{LoginRequest, RefreshRequest, RegisterRequest, UserService};
use crate::tenancy::{StoreDb, TenantDb};
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserView {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            email: u.email,
            full_name: u.full_name,
            role: u.role,
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: UserView,
    #[serde(flatten)]
    pub tokens: TokenPair,
    /// Store the tokens are valid for; `None` for platform operators
    pub tenant_id: Option<String>,
}

fn session(state: &AppState, user: user::Model, tenant_id: Option<String>) -> Result<SessionResponse, ServiceError> {
    let tokens = state.auth_service.generate_token(&user, tenant_id.clone())?;
    Ok(SessionResponse {
        user: user.into(),
        tokens,
        tenant_id,
    })
}

/// Logs in against the addressed database: platform operators on a system
/// subdomain, store accounts on their store's subdomain.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    summary = "Log in",
    request_body = LoginRequest,
    params(("X-Subdomain" = String, Header, description = "Store subdomain, or a system subdomain for operators")),
    responses(
        (status = 200, description = "Token pair issued", body = ApiResponse<SessionResponse>),
        (status = 401, description = "Invalid email or password", body = crate::errors::ErrorResponse),
        (status = 403, description = "Account disabled or store inactive", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    tenant: TenantDb,
    Json(request): Json<LoginRequest>,
) -> ApiResult<SessionResponse> {
    let user = UserService::new(tenant.db.clone())
        .authenticate(&request.email, &request.password)
        .await?;
    info!(user_id = %user.id, subdomain = %tenant.subdomain, "login succeeded");
    Ok(Json(ApiResponse::success(session(&state, user, tenant.tenant_id())?)))
}

/// Self-registration creates customers. Staff and admin accounts need a
/// store admin's bearer token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    summary = "Register a store account",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<SessionResponse>),
        (status = 403, description = "Role requires a store admin", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    store: StoreDb,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<SessionResponse>>), ServiceError> {
    let role = request.role.unwrap_or(UserRole::Customer);
    if role != UserRole::Customer {
        let caller = extract_auth_from_headers(&headers, &state.auth_service).await?;
        let same_store = caller.is_platform_operator() || caller.belongs_to_tenant(&store.subdomain);
        if !caller.is_admin() || !same_store {
            return Err(ServiceError::Forbidden(
                "Only a store admin can create staff accounts".into(),
            ));
        }
    }

    let user = UserService::new(store.db.clone()).register(request, role).await?;
    Ok(created_response(session(&state, user, store.tenant_id())?))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    summary = "Exchange a refresh token",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = ApiResponse<SessionResponse>),
        (status = 401, description = "Invalid, expired or reused refresh token", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    tenant: TenantDb,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<SessionResponse> {
    // store binding is checked before the token is spent
    let presented = state.auth_service.validate_token(&request.refresh_token).await?;
    if presented.tenant_id != tenant.tenant_id() {
        return Err(ServiceError::Forbidden(
            "Token was not issued for this store".into(),
        ));
    }
    let claims = state
        .auth_service
        .consume_refresh_token(&request.refresh_token)
        .await?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ServiceError::Unauthorized("Invalid token subject".into()))?;
    let user = UserService::new(tenant.db.clone()).find_by_id(user_id).await?;
    if !user.is_active {
        return Err(ServiceError::Forbidden("Account is disabled".into()));
    }
    Ok(Json(ApiResponse::success(session(&state, user, claims.tenant_id)?)))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    summary = "Current caller",
    responses(
        (status = 200, description = "Token identity", body = ApiResponse<AuthUser>),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn me(user: AuthUser) -> ApiResult<AuthUser> {
    Ok(Json(ApiResponse::success(user)))
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/refresh", post(refresh))
}

pub fn session_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(me))
}
