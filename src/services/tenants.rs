use anyhow::Context;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::hash_password;
use crate::db::run_tenant_migrations;
use crate::entities::master::{global_product, tenant};
use crate::entities::tenant::store_settings;
use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;
use crate::services::decimal_from_f64;
use crate::tenancy::{validate_subdomain, TenantRegistry};
use crate::tracing::with_metrics;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TenantAdmin {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateTenantRequest {
    pub subdomain: String,
    #[validate(length(min = 1, max = 200))]
    pub store_name: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub store_address: Option<String>,
    pub store_phone: Option<String>,
    #[validate(email)]
    pub store_email: Option<String>,
    /// First store administrator, created inside the new store database
    pub admin: Option<TenantAdmin>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateTenantStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProvisionedTenant {
    pub tenant: tenant::Model,
    pub admin_email: Option<String>,
}

/// Platform-wide counters for the operator dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PlatformStats {
    pub total_tenants: u64,
    pub active_tenants: u64,
    pub inactive_tenants: u64,
    /// Platform operators plus the accounts of active, provisioned stores
    pub total_users: u64,
    pub global_products: u64,
}

/// Store registry management for platform operators
pub struct TenantService {
    registry: Arc<TenantRegistry>,
}

impl TenantService {
    pub fn new(registry: Arc<TenantRegistry>) -> Self {
        Self { registry }
    }

    fn master(&self) -> Arc<DatabaseConnection> {
        self.registry.master()
    }

    #[instrument(skip(self))]
    pub async fn list_tenants(&self) -> Result<Vec<tenant::Model>, ServiceError> {
        Ok(tenant::Entity::find()
            .order_by_asc(tenant::Column::Subdomain)
            .all(&*self.master())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_tenant(&self, subdomain: &str) -> Result<tenant::Model, ServiceError> {
        self.registry
            .find_tenant(subdomain)
            .await?
            .ok_or_else(|| ServiceError::not_found("Store", subdomain))
    }

    /// Registers a store and provisions its database.
    ///
    /// The registry row is written first with `database_created = false` and
    /// only flipped once the schema and seed data are in place. Re-submitting
    /// a subdomain whose provisioning failed resumes it.
    #[instrument(skip(self, request), fields(subdomain = %request.subdomain))]
    pub async fn create_tenant(
        &self,
        request: CreateTenantRequest,
    ) -> Result<ProvisionedTenant, ServiceError> {
        request.validate()?;
        if let Some(admin) = &request.admin {
            admin.validate()?;
        }
        let subdomain = request.subdomain.trim().to_ascii_lowercase();
        validate_subdomain(&subdomain)?;

        let master = self.master();
        let row = match self.registry.find_tenant(&subdomain).await? {
            Some(existing) if existing.database_created => {
                return Err(ServiceError::Conflict(format!(
                    "Subdomain '{}' is already taken",
                    subdomain
                )));
            }
            Some(existing) => {
                info!(subdomain = %subdomain, "resuming incomplete store provisioning");
                existing
            }
            None => {
                tenant::ActiveModel {
                    subdomain: Set(subdomain.clone()),
                    store_name: Set(request.store_name.trim().to_string()),
                    database_name: Set(self.registry.config().tenant_database_name(&subdomain)),
                    latitude: Set(request.latitude),
                    longitude: Set(request.longitude),
                    store_address: Set(request.store_address.clone()),
                    store_phone: Set(request.store_phone.clone()),
                    store_email: Set(request.store_email.clone()),
                    is_active: Set(true),
                    database_created: Set(false),
                    ..Default::default()
                }
                .insert(&*master)
                .await?
            }
        };

        let admin_email = request.admin.as_ref().map(|a| a.email.to_ascii_lowercase());
        let provisioned = with_metrics("tenant_provisioning", || {
            self.provision(&row, &request)
        })
        .await;

        if let Err(e) = provisioned {
            error!(subdomain = %subdomain, error = %e, "store provisioning failed");
            return Err(e);
        }

        let mut active = row.into_active_model();
        active.database_created = Set(true);
        let tenant = active.update(&*master).await?;
        info!(subdomain = %tenant.subdomain, database = %tenant.database_name, "store provisioned");

        Ok(ProvisionedTenant {
            tenant,
            admin_email,
        })
    }

    async fn provision(
        &self,
        row: &tenant::Model,
        request: &CreateTenantRequest,
    ) -> Result<(), ServiceError> {
        self.registry
            .ensure_database(&row.database_name)
            .await
            .with_context(|| format!("creating database {}", row.database_name))?;
        let db = self
            .registry
            .connection_for(&row.database_name)
            .await
            .with_context(|| format!("connecting to {}", row.database_name))?;
        run_tenant_migrations(&db)
            .await
            .with_context(|| format!("migrating {}", row.database_name))?;

        if store_settings::Entity::find().one(&*db).await?.is_none() {
            store_settings::ActiveModel {
                store_name: Set(row.store_name.clone()),
                address: Set(row.store_address.clone()),
                phone: Set(row.store_phone.clone()),
                email: Set(row.store_email.clone()),
                currency: Set("USD".to_string()),
                tax_rate: Set(decimal_from_f64(self.registry.config().default_tax_rate)),
                receipt_footer: Set(None),
                ..Default::default()
            }
            .insert(&*db)
            .await?;
        }

        if let Some(admin) = &request.admin {
            let email = admin.email.to_ascii_lowercase();
            let exists = user::Entity::find()
                .filter(user::Column::Email.eq(email.as_str()))
                .one(&*db)
                .await?
                .is_some();
            if !exists {
                user::ActiveModel {
                    email: Set(email),
                    full_name: Set(admin.full_name.clone()),
                    password_hash: Set(hash_password(&admin.password)?),
                    role: Set(UserRole::Admin),
                    is_active: Set(true),
                    ..Default::default()
                }
                .insert(&*db)
                .await?;
            }
        }
        Ok(())
    }

    /// Activates or deactivates a store. Deactivated stores lose their cached pool.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        subdomain: &str,
        is_active: bool,
    ) -> Result<tenant::Model, ServiceError> {
        let existing = self.get_tenant(subdomain).await?;
        let database_name = existing.database_name.clone();

        let mut active = existing.into_active_model();
        active.is_active = Set(is_active);
        let updated = active.update(&*self.master()).await?;

        if !is_active {
            self.registry.evict(&database_name);
        }
        info!(subdomain = %updated.subdomain, is_active, "store status changed");
        Ok(updated)
    }

    /// Soft delete: the registry row and store database are kept so the
    /// store can be reactivated.
    pub async fn deactivate(&self, subdomain: &str) -> Result<tenant::Model, ServiceError> {
        self.set_status(subdomain, false).await
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<PlatformStats, ServiceError> {
        let master = self.master();
        let tenants = tenant::Entity::find().all(&*master).await?;
        let global_products = global_product::Entity::find().count(&*master).await?;

        let active: Vec<&tenant::Model> = tenants.iter().filter(|t| t.is_active).collect();
        let mut total_users = user::Entity::find().count(&*master).await?;
        for store in active.iter().filter(|t| t.database_created) {
            // one unreachable store should not blank the dashboard
            let counted = match self.registry.connection_for(&store.database_name).await {
                Ok(db) => user::Entity::find().count(&*db).await.map_err(ServiceError::from),
                Err(e) => Err(e),
            };
            match counted {
                Ok(n) => total_users += n,
                Err(e) => warn!(subdomain = %store.subdomain, error = %e, "skipping store in platform stats"),
            }
        }

        let total_tenants = tenants.len() as u64;
        let active_tenants = active.len() as u64;
        Ok(PlatformStats {
            total_tenants,
            active_tenants,
            inactive_tenants: total_tenants - active_tenants,
            total_users,
            global_products,
        })
    }
}
