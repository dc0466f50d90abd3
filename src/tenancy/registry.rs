use dashmap::DashMap;
use metrics::gauge;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, QueryFilter,
    Statement,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::is_system_subdomain;
use crate::config::AppConfig;
use crate::db::{establish_connection_with_config, DbConfig};
use crate::entities::master::tenant;
use crate::errors::ServiceError;

/// A resolved database for one request
#[derive(Clone, Debug)]
pub struct TenantConnection {
    pub db: Arc<DatabaseConnection>,
    pub subdomain: String,
    /// `None` when the subdomain routes to the master database
    pub tenant: Option<tenant::Model>,
}

impl TenantConnection {
    pub fn is_master(&self) -> bool {
        self.tenant.is_none()
    }
}

/// Tenant lookup plus a cache of open store connections keyed by database name
pub struct TenantRegistry {
    config: Arc<AppConfig>,
    master: Arc<DatabaseConnection>,
    pools: DashMap<String, Arc<DatabaseConnection>>,
}

impl TenantRegistry {
    pub fn new(config: Arc<AppConfig>, master: Arc<DatabaseConnection>) -> Self {
        Self {
            config,
            master,
            pools: DashMap::new(),
        }
    }

    pub fn master(&self) -> Arc<DatabaseConnection> {
        self.master.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn find_tenant(&self, subdomain: &str) -> Result<Option<tenant::Model>, ServiceError> {
        Ok(tenant::Entity::find()
            .filter(tenant::Column::Subdomain.eq(subdomain.to_ascii_lowercase()))
            .one(&*self.master)
            .await?)
    }

    /// Maps a subdomain to its database. System subdomains use the master database.
    pub async fn resolve(&self, subdomain: &str) -> Result<TenantConnection, ServiceError> {
        let subdomain = subdomain.to_ascii_lowercase();
        if is_system_subdomain(&subdomain) {
            return Ok(TenantConnection {
                db: self.master.clone(),
                subdomain,
                tenant: None,
            });
        }

        let tenant = self
            .find_tenant(&subdomain)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Store '{}' not found", subdomain)))?;

        if !tenant.is_active {
            return Err(ServiceError::Forbidden(format!(
                "Store '{}' is inactive",
                subdomain
            )));
        }
        if !tenant.database_created {
            return Err(ServiceError::ServiceUnavailable(format!(
                "Store '{}' is still being provisioned",
                subdomain
            )));
        }

        let db = self.connection_for(&tenant.database_name).await?;
        Ok(TenantConnection {
            db,
            subdomain,
            tenant: Some(tenant),
        })
    }

    /// Cached connection to a store database, opened on first use
    pub async fn connection_for(
        &self,
        database_name: &str,
    ) -> Result<Arc<DatabaseConnection>, ServiceError> {
        if let Some(existing) = self.pools.get(database_name).map(|e| e.value().clone()) {
            return Ok(existing);
        }

        let url = self.config.tenant_database_url(database_name);
        debug!(database = %database_name, "opening store database connection");
        let conn = Arc::new(
            establish_connection_with_config(&DbConfig::for_tenant(&self.config, url)).await?,
        );

        // A concurrent request may have won the race; keep whichever landed first.
        let conn = self
            .pools
            .entry(database_name.to_string())
            .or_insert(conn)
            .value()
            .clone();
        gauge!("retailos_tenant_pools", self.pools.len() as f64);
        Ok(conn)
    }

    /// Drops a cached connection, e.g. after a store is deactivated
    pub fn evict(&self, database_name: &str) {
        if self.pools.remove(database_name).is_some() {
            info!(database = %database_name, "evicted store connection");
            gauge!("retailos_tenant_pools", self.pools.len() as f64);
        }
    }

    pub fn cached_connections(&self) -> usize {
        self.pools.len()
    }

    /// Creates the physical store database if it does not exist yet.
    ///
    /// Postgres databases are created through the master connection; SQLite
    /// files are created on first connect, so only the parent directory is made.
    pub async fn ensure_database(&self, database_name: &str) -> Result<(), ServiceError> {
        let url = self.config.tenant_database_url(database_name);

        if url.starts_with("postgres") {
            if self.master.get_database_backend() != DatabaseBackend::Postgres {
                return Err(ServiceError::InternalError(
                    "Postgres store databases require a Postgres master database".into(),
                ));
            }
            let exists = self
                .master
                .query_one(Statement::from_sql_and_values(
                    DatabaseBackend::Postgres,
                    "SELECT 1 FROM pg_database WHERE datname = $1",
                    [database_name.into()],
                ))
                .await
                .map_err(ServiceError::DatabaseError)?
                .is_some();
            if !exists {
                info!(database = %database_name, "creating store database");
                self.master
                    .execute_unprepared(&format!(
                        "CREATE DATABASE \"{}\"",
                        database_name.replace('"', "")
                    ))
                    .await
                    .map_err(ServiceError::DatabaseError)?;
            }
            return Ok(());
        }

        if let Some(path) = sqlite_file_path(&url) {
            if let Some(parent) = Path::new(&path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        ServiceError::InternalError(format!("cannot create data directory: {}", e))
                    })?;
                }
            }
        } else {
            warn!(database = %database_name, "unrecognized store database URL scheme");
        }
        Ok(())
    }
}

/// Filesystem path of a `sqlite://` URL, without query parameters
fn sqlite_file_path(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_paths_strip_scheme_and_query() {
        assert_eq!(
            sqlite_file_path("sqlite://data/retailstore_tenant_corner.db?mode=rwc").as_deref(),
            Some("data/retailstore_tenant_corner.db")
        );
        assert_eq!(
            sqlite_file_path("sqlite:///tmp/x.db").as_deref(),
            Some("/tmp/x.db")
        );
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("postgres://db/x"), None);
    }
}
