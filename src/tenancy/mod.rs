//! Per-request store routing.
//!
//! Every store has its own database. A request names its store through the
//! `X-Subdomain` header, the `Host`, a `?subdomain=` query parameter or the
//! `Referer` (see [`resolver`]). [`TenantDb`] resolves that to a cached
//! connection and enforces that store tokens only reach their own store.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::debug;

use crate::auth::AuthUser;
use crate::entities::master::tenant;
use crate::errors::ServiceError;
use crate::AppState;

pub mod registry;
pub mod resolver;

pub use registry::{TenantConnection, TenantRegistry};
pub use resolver::{resolve_subdomain, SubdomainSource, SUBDOMAIN_HEADER};

/// Subdomains served by the master database
pub const SYSTEM_SUBDOMAINS: [&str; 5] = ["retailos", "system", "admin", "www", "api"];

pub const SUBDOMAIN_REQUIRED_MESSAGE: &str =
    "Subdomain required. Provide X-Subdomain header or access via a tenant subdomain";

pub fn is_system_subdomain(subdomain: &str) -> bool {
    SYSTEM_SUBDOMAINS.contains(&subdomain)
}

/// Checks a subdomain is usable for a new store
pub fn validate_subdomain(subdomain: &str) -> Result<(), ServiceError> {
    let well_formed = subdomain
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    if subdomain.is_empty() || subdomain.len() > 63 || !well_formed {
        return Err(ServiceError::ValidationError(
            "Subdomain must be 1-63 lowercase letters or digits".into(),
        ));
    }
    if is_system_subdomain(subdomain) {
        return Err(ServiceError::ValidationError(format!(
            "'{}' is reserved",
            subdomain
        )));
    }
    Ok(())
}

/// Enforces cross-tenant isolation for an authenticated caller
pub fn check_tenant_access(user: &AuthUser, conn: &TenantConnection) -> Result<(), ServiceError> {
    if user.is_platform_operator() {
        return Ok(());
    }
    if conn.is_master() || !user.belongs_to_tenant(&conn.subdomain) {
        return Err(ServiceError::Forbidden(
            "Token was not issued for this store".into(),
        ));
    }
    Ok(())
}

/// Database connection for the store addressed by the request.
/// System subdomains resolve to the master database.
#[derive(Clone, Debug)]
pub struct TenantDb {
    pub db: Arc<DatabaseConnection>,
    pub subdomain: String,
    pub tenant: Option<tenant::Model>,
}

impl TenantDb {
    pub fn is_master(&self) -> bool {
        self.tenant.is_none()
    }

    /// Store subdomain for store databases, `None` for the master database
    pub fn tenant_id(&self) -> Option<String> {
        self.tenant.as_ref().map(|t| t.subdomain.clone())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for TenantDb {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<TenantDb>() {
            return Ok(existing.clone());
        }

        let (subdomain, source) = resolve_subdomain(&parts.headers, &parts.uri)
            .ok_or_else(|| ServiceError::BadRequest(SUBDOMAIN_REQUIRED_MESSAGE.into()))?;

        let conn = state.tenants.resolve(&subdomain).await?;
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            check_tenant_access(user, &conn)?;
        }
        debug!(subdomain = %conn.subdomain, ?source, master = conn.is_master(), "resolved store");

        let resolved = TenantDb {
            db: conn.db,
            subdomain: conn.subdomain,
            tenant: conn.tenant,
        };
        parts.extensions.insert(resolved.clone());
        Ok(resolved)
    }
}

/// Like [`TenantDb`] but only for real stores; system subdomains are rejected.
#[derive(Clone, Debug)]
pub struct StoreDb(pub TenantDb);

impl std::ops::Deref for StoreDb {
    type Target = TenantDb;

    fn deref(&self) -> &TenantDb {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for StoreDb {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let tenant_db = TenantDb::from_request_parts(parts, state).await?;
        if tenant_db.is_master() {
            return Err(ServiceError::BadRequest(
                "This endpoint requires a store subdomain".into(),
            ));
        }
        Ok(StoreDb(tenant_db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use uuid::Uuid;

    #[rstest]
    #[case("corner", true)]
    #[case("store42", true)]
    #[case("Corner", false)]
    #[case("corner-shop", false)]
    #[case("", false)]
    #[case("admin", false)]
    #[case("www", false)]
    fn subdomain_validation(#[case] subdomain: &str, #[case] ok: bool) {
        assert_eq!(validate_subdomain(subdomain).is_ok(), ok);
    }

    fn user(tenant: Option<&str>, role: &str) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4().to_string(),
            name: None,
            email: None,
            roles: vec![role.to_string()],
            permissions: vec![],
            tenant_id: tenant.map(str::to_string),
            token_id: Uuid::new_v4().to_string(),
        }
    }

    fn conn(subdomain: &str, master: bool) -> TenantConnection {
        let now = Utc::now();
        TenantConnection {
            db: Arc::new(DatabaseConnection::Disconnected),
            subdomain: subdomain.to_string(),
            tenant: (!master).then(|| tenant::Model {
                id: Uuid::new_v4(),
                subdomain: subdomain.to_string(),
                store_name: "Corner".into(),
                database_name: format!("retailstore_tenant_{}", subdomain),
                latitude: None,
                longitude: None,
                store_address: None,
                store_phone: None,
                store_email: None,
                is_active: true,
                database_created: true,
                created_at: now,
                updated_at: now,
            }),
        }
    }

    #[test]
    fn store_token_only_reaches_its_store() {
        let clerk = user(Some("corner"), "staff");
        assert!(check_tenant_access(&clerk, &conn("corner", false)).is_ok());
        assert!(check_tenant_access(&clerk, &conn("bakery", false)).is_err());
        assert!(check_tenant_access(&clerk, &conn("admin", true)).is_err());
    }

    #[test]
    fn platform_operator_reaches_every_store() {
        let operator = user(None, "superadmin");
        assert!(check_tenant_access(&operator, &conn("corner", false)).is_ok());
        assert!(check_tenant_access(&operator, &conn("admin", true)).is_ok());
    }

    #[test]
    fn tenantless_non_operator_is_rejected() {
        let odd = user(None, "staff");
        assert!(check_tenant_access(&odd, &conn("corner", false)).is_err());
    }
}
