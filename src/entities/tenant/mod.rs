pub mod campaign;
pub mod campaign_product;
pub mod customer;
pub mod expense;
pub mod invoice;
pub mod invoice_item;
pub mod order;
pub mod order_item;
pub mod payment_config;
pub mod pos_mapping;
pub mod product;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod sale;
pub mod sale_item;
pub mod shelf_audit;
pub mod shelf_audit_item;
pub mod stock_movement;
pub mod store_settings;
pub mod vendor;
