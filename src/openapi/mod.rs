use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RetailOS API",
        version = "1.0.0",
        description = r#"
# RetailOS Store Platform API

Multi-tenant point-of-sale and back office API. Every store gets its own
database; the platform database holds the store registry, platform operators
and the shared product catalog.

## Addressing a store

Requests are routed by the `X-Subdomain` header, the first label of the
`Host` header (`downtown.retailos.app`), a `?subdomain=` query parameter or the
`Referer` host, in that order. Store endpoints answer `400` when none of these
is present or when a system subdomain (`admin`, `www`, ...) is addressed.

## Authentication

Log in against the store you are addressing and send the access token:

```
Authorization: Bearer <access-token>
```

A token minted for one store is rejected by every other store.

## Responses

Every body is wrapped in an envelope:

```json
{ "success": true, "data": { }, "message": null }
```
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "system", description = "Status and health"),
        (name = "auth", description = "Login, registration and token refresh"),
        (name = "tenants", description = "Store provisioning (superadmin)"),
        (name = "catalog", description = "Shared barcode catalog"),
        (name = "products", description = "Store products and stock"),
        (name = "inventory", description = "Inventory health and restocking"),
        (name = "audits", description = "Shelf counts and stock reconciliation"),
        (name = "purchase-orders", description = "Vendor purchase orders"),
        (name = "sales", description = "Point-of-sale transactions"),
        (name = "orders", description = "Online orders and payments"),
        (name = "shop", description = "Customer storefront and checkout"),
        (name = "invoices", description = "Supplier invoice intake"),
        (name = "campaigns", description = "Promotional campaigns"),
        (name = "expenses", description = "Operating expenses"),
        (name = "settings", description = "Store configuration"),
        (name = "reports", description = "Profit reporting"),
        (name = "ai", description = "Generated product content"),
        (name = "supplier", description = "Supplier portal quoting")
    ),
    paths(
        crate::handlers::system::api_status,
        crate::handlers::system::health_check,
        crate::handlers::system::current_store,
        crate::handlers::auth::login,
        crate::handlers::auth::register,
        crate::handlers::auth::refresh,
        crate::handlers::auth::me,
        crate::handlers::tenants::list_tenants,
        crate::handlers::tenants::create_tenant,
        crate::handlers::tenants::deactivate_tenant,
        crate::handlers::tenants::platform_stats,
        crate::handlers::catalog::search_catalog,
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::adjust_stock,
        crate::handlers::inventory::inventory_health,
        crate::handlers::inventory::auto_restock,
        crate::handlers::purchase_orders::get_purchase_order,
        crate::handlers::audits::start_audit,
        crate::handlers::audits::complete_audit,
        crate::handlers::audits::get_audit,
        crate::handlers::sales::create_sale,
        crate::handlers::sales::process_sales,
        crate::handlers::sales::process_z_report,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::create_order,
        crate::handlers::orders::create_payment_intent,
        crate::handlers::shop::shop_products,
        crate::handlers::shop::shop_categories,
        crate::handlers::shop::checkout,
        crate::handlers::invoices::parse_invoice,
        crate::handlers::invoices::commit_invoice,
        crate::handlers::campaigns::create_campaign,
        crate::handlers::campaigns::generate_post,
        crate::handlers::campaigns::push_to_sale,
        crate::handlers::expenses::list_expenses,
        crate::handlers::settings::update_store_settings,
        crate::handlers::reports::profit_summary,
        crate::handlers::ai::product_description,
        crate::handlers::supplier::send_quote,
        crate::handlers::supplier::estimate_quote,
    ),
    components(schemas(crate::errors::ErrorResponse, crate::auth::TokenPair)),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_store_routes_and_bearer_scheme() {
        let json = ApiDocV1::openapi().to_json().unwrap();
        assert!(json.contains("RetailOS API"));
        assert!(json.contains("/api/v1/sales"));
        assert!(json.contains("/api/v1/supplier/quotes/estimate"));
        assert!(json.contains("/api/v1/shop/checkout"));
        assert!(json.contains("/api/v1/audits/{id}/complete"));
        assert!(json.contains("\"Bearer\""));
    }
}
