//! Schema migrations for the platform.
//!
//! Two independent migrators live here. `MasterMigrator` owns the platform
//! database (tenant registry, global catalog, operators). `TenantMigrator`
//! is run once against every store database when the store is provisioned.
pub use sea_orm_migration::prelude::*;

mod m20250201_000003_create_users_table;
mod master;
mod tenant;

pub struct MasterMigrator;

#[async_trait::async_trait]
impl MigratorTrait for MasterMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(master::m20250201_000001_create_tenants_table::Migration),
            Box::new(master::m20250201_000002_create_global_products_table::Migration),
            Box::new(m20250201_000003_create_users_table::Migration),
        ]
    }
}

pub struct TenantMigrator;

#[async_trait::async_trait]
impl MigratorTrait for TenantMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250201_000003_create_users_table::Migration),
            Box::new(tenant::m20250201_000101_create_settings_tables::Migration),
            Box::new(tenant::m20250201_000102_create_products_table::Migration),
            Box::new(tenant::m20250201_000103_create_sales_tables::Migration),
            Box::new(tenant::m20250201_000104_create_customer_order_tables::Migration),
            Box::new(tenant::m20250201_000105_create_purchasing_tables::Migration),
            Box::new(tenant::m20250201_000106_create_campaign_tables::Migration),
            Box::new(tenant::m20250201_000107_create_expense_and_pos_tables::Migration),
            Box::new(tenant::m20250201_000108_create_shelf_audit_tables::Migration),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm_migration::sea_orm::{
        ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement,
    };

    async fn memory_db() -> DatabaseConnection {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).sqlx_logging(false);
        Database::connect(opts).await.unwrap()
    }

    #[tokio::test]
    async fn tenant_schema_applies_on_sqlite() {
        let db = memory_db().await;
        TenantMigrator::up(&db, None).await.unwrap();

        let manager = SchemaManager::new(&db);
        for table in ["products", "sales", "sale_items", "invoices", "expenses", "shelf_audits"] {
            assert!(manager.has_table(table).await.unwrap(), "missing {}", table);
        }

        db.execute(Statement::from_string(
            db.get_database_backend(),
            "INSERT INTO expenses (id, category, description, amount, expense_date, created_at) \
             VALUES ('e1', 'Rent', 'May', 123456789012.3456, '2024-05-01', '2024-05-01T00:00:00Z')",
        ))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn master_schema_applies_on_sqlite() {
        let db = memory_db().await;
        MasterMigrator::up(&db, None).await.unwrap();

        let manager = SchemaManager::new(&db);
        assert!(manager.has_table("tenants").await.unwrap());
        assert!(manager.has_table("global_products").await.unwrap());
    }
}
