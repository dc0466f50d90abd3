pub mod m20250201_000001_create_tenants_table;
pub mod m20250201_000002_create_global_products_table;
