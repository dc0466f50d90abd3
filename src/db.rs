use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge};
use migrations::{MasterMigrator, MigratorTrait, TenantMigrator};
use sea_orm::sea_query::{Expr, Func, IntoColumnRef, SimpleExpr};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::{debug, error, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl DbConfig {
    /// Pool settings for a store database. Store pools are kept small since
    /// one exists per active tenant.
    pub fn for_tenant(cfg: &AppConfig, url: String) -> Self {
        let base = Self::from(cfg);
        Self {
            url,
            max_connections: (base.max_connections / 4).max(1),
            min_connections: base.min_connections.min(1),
            ..base
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!(
        max_connections = config.max_connections,
        "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("retailos_db.max_connections", config.max_connections as f64);

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!("Database connection failed: {}", e);
        counter!("retailos_db.connection_failures", 1);
        ServiceError::DatabaseError(e)
    })?;

    info!(
        "Database connection pool established (max_connections={})",
        config.max_connections
    );
    Ok(db_pool)
}

/// Establish the master DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Applies the platform schema (tenants, global catalog, operators)
pub async fn run_master_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running master database migrations");
    let start = std::time::Instant::now();

    let result = MasterMigrator::up(pool, None)
        .await
        .map_err(|e| ServiceError::MigrationError(e.to_string()));

    match &result {
        Ok(_) => info!("Master migrations completed in {:?}", start.elapsed()),
        Err(e) => error!("Master migrations failed after {:?}: {}", start.elapsed(), e),
    }
    result
}

/// Applies the store schema to a tenant database
pub async fn run_tenant_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let start = std::time::Instant::now();

    let result = TenantMigrator::up(pool, None)
        .await
        .map_err(|e| ServiceError::MigrationError(e.to_string()));

    match &result {
        Ok(_) => info!("Tenant migrations completed in {:?}", start.elapsed()),
        Err(e) => error!("Tenant migrations failed after {:?}: {}", start.elapsed(), e),
    }
    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let start = std::time::Instant::now();
    let result = pool.ping().await.map_err(ServiceError::DatabaseError);

    match &result {
        Ok(_) => {
            gauge!(
                "retailos_db.connection_latency",
                start.elapsed().as_millis() as f64
            );
        }
        Err(e) => {
            error!("Database connection check failed: {}", e);
            counter!("retailos_db.connection_failures", 1);
        }
    }
    result
}

/// `LOWER(col) LIKE '%needle%'`, portable across Postgres and SQLite.
pub fn contains_ci<C: IntoColumnRef>(col: C, needle: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(col))).like(format!("%{}%", needle.trim().to_lowercase()))
}

/// `LOWER(col) = lower(value)`
pub fn equals_ci<C: IntoColumnRef>(col: C, value: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(col))).eq(value.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::{Alias, Query, SqliteQueryBuilder};

    #[test]
    fn contains_ci_lowercases_both_sides() {
        let sql = Query::select()
            .column(Alias::new("name"))
            .from(Alias::new("products"))
            .and_where(contains_ci(Alias::new("name"), "  KetChup "))
            .to_string(SqliteQueryBuilder);
        assert!(sql.contains("LOWER(\"name\") LIKE '%ketchup%'"), "{}", sql);
    }

    #[test]
    fn tenant_pool_is_smaller_than_master() {
        let cfg = AppConfig::new(
            "sqlite://master.db".into(),
            "sqlite://{db_name}.db".into(),
            "x".repeat(64),
            3600,
            7200,
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        let tenant = DbConfig::for_tenant(&cfg, "sqlite://t.db".into());
        assert_eq!(tenant.url, "sqlite://t.db");
        assert!(tenant.max_connections <= cfg.db_max_connections);
        assert!(tenant.max_connections >= 1);
    }

    #[tokio::test]
    async fn both_migrators_apply_to_fresh_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let master_url = format!("sqlite://{}/master.db?mode=rwc", dir.path().display());
        let tenant_url = format!("sqlite://{}/tenant.db?mode=rwc", dir.path().display());
        let master = establish_connection_with_config(&DbConfig {
            url: master_url,
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        let tenant = establish_connection_with_config(&DbConfig {
            url: tenant_url,
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();

        run_master_migrations(&master).await.unwrap();
        run_tenant_migrations(&tenant).await.unwrap();
        // idempotent
        run_tenant_migrations(&tenant).await.unwrap();
        check_connection(&tenant).await.unwrap();
    }
}
