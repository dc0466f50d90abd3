pub mod m20250201_000101_create_settings_tables;
pub mod m20250201_000102_create_products_table;
pub mod m20250201_000103_create_sales_tables;
pub mod m20250201_000104_create_customer_order_tables;
pub mod m20250201_000105_create_purchasing_tables;
pub mod m20250201_000106_create_campaign_tables;
pub mod m20250201_000107_create_expense_and_pos_tables;
pub mod m20250201_000108_create_shelf_audit_tables;
