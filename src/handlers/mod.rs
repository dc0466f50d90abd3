//! HTTP handlers, one module per resource.
//!
//! Each module exposes `routes()`; [`crate::api_v1_routes`] nests them and
//! applies the permission layers. Store handlers take a [`StoreDb`] so the
//! service they build always talks to the caller's store database.
//!
//! [`StoreDb`]: crate::tenancy::StoreDb

pub mod common;

// Platform
pub mod auth;
pub mod catalog;
pub mod system;
pub mod tenants;

// Store inventory
pub mod inventory;
pub mod pos_mappings;
pub mod products;
pub mod purchase_orders;

// Shelf counts
pub mod audits;

// Selling
pub mod campaigns;
pub mod customers;
pub mod orders;
pub mod sales;
pub mod shop;

// Purchasing and finance
pub mod expenses;
pub mod invoices;
pub mod reports;
pub mod vendors;

// Store configuration and helpers
pub mod ai;
pub mod settings;

// Supplier-side quoting
pub mod supplier;
