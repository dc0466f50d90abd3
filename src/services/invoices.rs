use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::equals_ci;
use crate::entities::tenant::{
    invoice, invoice_item, product,
    stock_movement::{self, MovementType},
    vendor,
};
use crate::errors::ServiceError;
use crate::integrations::ai::{DocumentReader, ImageUpload, ParsedInvoice, ParsedInvoiceItem, ParsedVendor};
use crate::services::money;
use crate::services::products::increment_stock;

/// Selling price markup for products first seen on an invoice
pub const NEW_PRODUCT_MARKUP: Decimal = dec!(1.3);
const DEFAULT_HISTORY_LIMIT: u64 = 50;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommitResult {
    pub success: bool,
    pub invoice_id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub items_committed: usize,
    pub inventory_items_updated: usize,
    pub inventory_items_created: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: invoice::Model,
    pub items: Vec<invoice_item::Model>,
}

/// `line_total / quantity` when the invoice left the unit cost blank
pub fn effective_unit_cost(item: &ParsedInvoiceItem) -> Decimal {
    if item.unit_cost.is_zero() && item.quantity > 0 {
        money(item.line_total / Decimal::from(item.quantity))
    } else {
        item.unit_cost
    }
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Name match first, then UPC against the product barcode
async fn match_product<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    upc: Option<&str>,
) -> Result<Option<product::Model>, ServiceError> {
    if !name.trim().is_empty() {
        let by_name = product::Entity::find()
            .filter(equals_ci(product::Column::Name, name))
            .one(conn)
            .await?;
        if by_name.is_some() {
            return Ok(by_name);
        }
    }
    match upc.map(str::trim).filter(|u| !u.is_empty()) {
        Some(upc) => Ok(product::Entity::find()
            .filter(product::Column::Barcode.eq(upc))
            .one(conn)
            .await?),
        None => Ok(None),
    }
}

/// Supplier invoices: AI parsing, review, and committing into stock
pub struct InvoiceService {
    db: Arc<DatabaseConnection>,
}

impl InvoiceService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Reads an invoice image and suggests a store product for every line.
    /// Lookup failures leave the line unmatched.
    #[instrument(skip(self, reader, upload))]
    pub async fn parse(
        &self,
        reader: &dyn DocumentReader,
        upload: &ImageUpload,
    ) -> Result<ParsedInvoice, ServiceError> {
        let mut parsed = reader.read_invoice(upload).await?;
        for item in &mut parsed.items {
            item.unit_cost = effective_unit_cost(item);
            item.matched_product_id =
                match match_product(&*self.db, &item.product_name, item.upc.as_deref()).await {
                    Ok(found) => found.map(|p| p.id),
                    Err(e) => {
                        warn!(error = %e, item = %item.product_name, "product matching failed");
                        None
                    }
                };
        }
        info!(items = parsed.items.len(), "invoice parsed");
        Ok(parsed)
    }

    /// Finds the vendor by name and fills in any details the invoice adds
    async fn upsert_vendor(
        txn: &DatabaseTransaction,
        name: &str,
        details: ParsedVendor,
    ) -> Result<vendor::Model, ServiceError> {
        let existing = vendor::Entity::find()
            .filter(equals_ci(vendor::Column::Name, name))
            .one(txn)
            .await?;

        match existing {
            Some(old) => {
                let mut active = old.clone().into_active_model();
                active.ein = Set(non_empty(details.ein).or(old.ein));
                active.address = Set(non_empty(details.address).or(old.address));
                active.website = Set(non_empty(details.website).or(old.website));
                active.email = Set(non_empty(details.email).or(old.email));
                active.contact_phone = Set(non_empty(details.phone).or(old.contact_phone));
                active.fax = Set(non_empty(details.fax).or(old.fax));
                active.poc_name = Set(non_empty(details.poc_name).or(old.poc_name));
                Ok(active.update(txn).await?)
            }
            None => Ok(vendor::ActiveModel {
                name: Set(name.to_string()),
                ein: Set(non_empty(details.ein)),
                address: Set(non_empty(details.address)),
                website: Set(non_empty(details.website)),
                email: Set(non_empty(details.email)),
                contact_phone: Set(non_empty(details.phone)),
                fax: Set(non_empty(details.fax)),
                poc_name: Set(non_empty(details.poc_name)),
                ..Default::default()
            }
            .insert(txn)
            .await?),
        }
    }

    /// Saves a reviewed invoice and books every line into inventory
    #[instrument(skip(self, payload), fields(items = payload.items.len()))]
    pub async fn commit(&self, payload: ParsedInvoice) -> Result<CommitResult, ServiceError> {
        if payload.items.is_empty() {
            return Err(ServiceError::ValidationError("Invoice has no items".into()));
        }
        if let Some(bad) = payload.items.iter().find(|i| i.quantity <= 0) {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for {} must be positive",
                bad.product_name
            )));
        }

        let supplier_name = non_empty(payload.supplier_name.clone())
            .or_else(|| non_empty(payload.vendor.name.clone()))
            .unwrap_or_else(|| "Unknown Supplier".to_string());
        let invoice_number = non_empty(payload.invoice_number.clone())
            .unwrap_or_else(|| format!("INV-{}", Utc::now().timestamp_millis()));
        let vendor_name = non_empty(payload.vendor.name.clone()).unwrap_or_else(|| supplier_name.clone());

        let txn = self.db.begin().await?;
        let vendor = Self::upsert_vendor(&txn, &vendor_name, payload.vendor.clone()).await?;

        let created = invoice::ActiveModel {
            vendor_id: Set(Some(vendor.id)),
            supplier_name: Set(supplier_name),
            invoice_number: Set(invoice_number.clone()),
            invoice_date: Set(parse_date(payload.invoice_date.as_deref())),
            total_amount: Set(payload.total_amount),
            total_tax: Set(payload.total_tax),
            total_transport: Set(payload.total_transport),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut updated = 0;
        let mut created_products = 0;
        for item in &payload.items {
            let unit_cost = effective_unit_cost(item);
            let line_total = unit_cost
                .checked_mul(Decimal::from(item.quantity))
                .map(money)
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Line total for {} is too large",
                        item.product_name
                    ))
                })?;

            let matched = match item.matched_product_id {
                Some(id) => match product::Entity::find_by_id(id).one(&txn).await? {
                    Some(p) => Some(p),
                    None => match_product(&txn, &item.product_name, item.upc.as_deref()).await?,
                },
                None => match_product(&txn, &item.product_name, item.upc.as_deref()).await?,
            };

            let product_id = match matched {
                Some(existing) => {
                    let id = existing.id;
                    increment_stock(&txn, id, item.quantity).await?;
                    let mut active = existing.into_active_model();
                    active.cost_price = Set(unit_cost);
                    active.update(&txn).await?;
                    stock_movement::record(
                        id,
                        MovementType::Invoice,
                        item.quantity,
                        format!("Invoice {}", invoice_number),
                    )
                    .insert(&txn)
                    .await?;
                    updated += 1;
                    id
                }
                None => {
                    let new_product = product::ActiveModel {
                        name: Set(item.product_name.trim().to_string()),
                        barcode: Set(non_empty(item.upc.clone())),
                        category: Set("Uncategorized".to_string()),
                        description: Set(Some(format!(
                            "{} (from invoice {})",
                            item.product_name.trim(),
                            invoice_number
                        ))),
                        cost_price: Set(unit_cost),
                        selling_price: Set(unit_cost
                            .checked_mul(NEW_PRODUCT_MARKUP)
                            .map(money)
                            .unwrap_or(unit_cost)),
                        stock: Set(item.quantity),
                        reorder_level: Set(10),
                        ..Default::default()
                    }
                    .insert(&txn)
                    .await?;
                    stock_movement::record(
                        new_product.id,
                        MovementType::Invoice,
                        item.quantity,
                        format!("Invoice {}", invoice_number),
                    )
                    .insert(&txn)
                    .await?;
                    created_products += 1;
                    new_product.id
                }
            };

            invoice_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_id: Set(created.id),
                product_id: Set(Some(product_id)),
                product_name: Set(item.product_name.trim().to_string()),
                vendor_code: Set(non_empty(item.vendor_code.clone())),
                upc: Set(non_empty(item.upc.clone())),
                quantity: Set(item.quantity),
                unit_cost: Set(unit_cost),
                line_total: Set(line_total),
                expiry_date: Set(parse_date(item.expiry_date.as_deref())),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        info!(
            invoice_id = %created.id,
            updated,
            created = created_products,
            "invoice committed"
        );
        Ok(CommitResult {
            success: true,
            invoice_id: created.id,
            vendor_id: Some(vendor.id),
            items_committed: payload.items.len(),
            inventory_items_updated: updated,
            inventory_items_created: created_products,
        })
    }

    async fn with_items(&self, invoices: Vec<invoice::Model>) -> Result<Vec<InvoiceDetail>, ServiceError> {
        let ids: Vec<Uuid> = invoices.iter().map(|i| i.id).collect();
        let mut grouped: HashMap<Uuid, Vec<invoice_item::Model>> = HashMap::new();
        for item in invoice_item::Entity::find()
            .filter(invoice_item::Column::InvoiceId.is_in(ids))
            .all(&*self.db)
            .await?
        {
            grouped.entry(item.invoice_id).or_default().push(item);
        }

        Ok(invoices
            .into_iter()
            .map(|invoice| InvoiceDetail {
                items: grouped.remove(&invoice.id).unwrap_or_default(),
                invoice,
            })
            .collect())
    }

    /// Newest first
    pub async fn history(&self, limit: Option<u64>) -> Result<Vec<InvoiceDetail>, ServiceError> {
        let invoices = invoice::Entity::find()
            .order_by_desc(invoice::Column::CreatedAt)
            .limit(limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500))
            .all(&*self.db)
            .await?;
        self.with_items(invoices).await
    }

    pub async fn get(&self, id: Uuid) -> Result<InvoiceDetail, ServiceError> {
        let invoice = invoice::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Invoice", id))?;
        let mut found = self.with_items(vec![invoice]).await?;
        found
            .pop()
            .ok_or_else(|| ServiceError::not_found("Invoice", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::ai::MockDocumentReader;
    use crate::services::testing::{seed_product, store_db};
    use rstest::rstest;

    fn line(name: &str, upc: Option<&str>, quantity: i32, unit_cost: Decimal, line_total: Decimal) -> ParsedInvoiceItem {
        ParsedInvoiceItem {
            product_name: name.into(),
            upc: upc.map(str::to_string),
            quantity,
            unit_cost,
            line_total,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(dec!(0), dec!(24.00), 12, dec!(2.00))]
    #[case(dec!(1.75), dec!(99), 4, dec!(1.75))]
    #[case(dec!(0), dec!(10), 0, dec!(0))]
    fn blank_unit_cost_is_derived(
        #[case] unit_cost: Decimal,
        #[case] line_total: Decimal,
        #[case] quantity: i32,
        #[case] expected: Decimal,
    ) {
        let item = line("x", None, quantity, unit_cost, line_total);
        assert_eq!(effective_unit_cost(&item), expected);
    }

    #[test]
    fn invoice_dates_accept_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(parse_date(Some("2024-03-09")), expected);
        assert_eq!(parse_date(Some("03/09/2024")), expected);
        assert_eq!(parse_date(Some("yesterday")), None);
        assert_eq!(parse_date(None), None);
    }

    #[tokio::test]
    async fn parse_matches_by_name_and_upc() {
        let (_dir, db) = store_db().await;
        let ketchup = seed_product(&db, "Heinz Ketchup", 2, dec!(3), dec!(4.5)).await;
        let mut mustard: product::ActiveModel =
            seed_product(&db, "Yellow Mustard", 2, dec!(1), dec!(2)).await.into();
        mustard.barcode = Set(Some("0001112223334".into()));
        let mustard = mustard.update(&*db).await.unwrap();

        let mut reader = MockDocumentReader::new();
        reader.expect_read_invoice().returning(|_| {
            Ok(ParsedInvoice {
                supplier_name: Some("Sysco".into()),
                items: vec![
                    line("HEINZ KETCHUP", None, 12, dec!(0), dec!(30.00)),
                    line("Mustard 8oz", Some("0001112223334"), 6, dec!(0.90), dec!(5.40)),
                    line("Brand New Sauce", None, 3, dec!(2), dec!(6)),
                ],
                ..Default::default()
            })
        });

        let upload = ImageUpload {
            image_base64: "aGVsbG8=".into(),
            mime_type: "application/pdf".into(),
        };
        let parsed = InvoiceService::new(db).parse(&reader, &upload).await.unwrap();
        assert_eq!(parsed.items[0].matched_product_id, Some(ketchup.id));
        assert_eq!(parsed.items[0].unit_cost, dec!(2.50));
        assert_eq!(parsed.items[1].matched_product_id, Some(mustard.id));
        assert_eq!(parsed.items[2].matched_product_id, None);
    }

    #[tokio::test]
    async fn commit_refuses_receipts_past_the_stock_limit() {
        let (_dir, db) = store_db().await;
        let rice = seed_product(&db, "Rice", i32::MAX - 1, dec!(3), dec!(4)).await;
        let service = InvoiceService::new(db.clone());

        let result = service
            .commit(ParsedInvoice {
                supplier_name: Some("Sysco".into()),
                items: vec![line("Rice", None, 2, dec!(3), dec!(6))],
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));

        let rice = product::Entity::find_by_id(rice.id).one(&*db).await.unwrap().unwrap();
        assert_eq!(rice.stock, i32::MAX - 1);
        assert_eq!(invoice::Entity::find().all(&*db).await.unwrap().len(), 0);

        let result = service
            .commit(ParsedInvoice {
                supplier_name: Some("Sysco".into()),
                items: vec![line("Gold", None, 2, Decimal::MAX, dec!(0))],
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn commit_updates_matches_and_creates_the_rest() {
        let (_dir, db) = store_db().await;
        let ketchup = seed_product(&db, "Heinz Ketchup", 2, dec!(3), dec!(4.5)).await;
        let service = InvoiceService::new(db.clone());

        let payload = ParsedInvoice {
            supplier_name: Some("Sysco".into()),
            invoice_number: Some("INV-778".into()),
            invoice_date: Some("2024-05-01".into()),
            total_amount: dec!(36),
            vendor: ParsedVendor {
                name: Some("Sysco".into()),
                email: Some("ar@sysco.test".into()),
                ..Default::default()
            },
            items: vec![
                line("heinz ketchup", None, 10, dec!(2.80), dec!(28)),
                line("Brand New Sauce", Some("999"), 4, dec!(2), dec!(8)),
            ],
            ..Default::default()
        };
        let result = service.commit(payload).await.unwrap();
        assert!(result.success);
        assert_eq!(result.items_committed, 2);
        assert_eq!(result.inventory_items_updated, 1);
        assert_eq!(result.inventory_items_created, 1);

        let ketchup = product::Entity::find_by_id(ketchup.id).one(&*db).await.unwrap().unwrap();
        assert_eq!(ketchup.stock, 12);
        assert_eq!(ketchup.cost_price.round_dp(2), dec!(2.80));

        let sauce = product::Entity::find()
            .filter(product::Column::Name.eq("Brand New Sauce"))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sauce.stock, 4);
        assert_eq!(sauce.selling_price.round_dp(2), dec!(2.60));
        assert_eq!(sauce.reorder_level, 10);
        assert_eq!(
            sauce.description.as_deref(),
            Some("Brand New Sauce (from invoice INV-778)")
        );

        // a second invoice from the same vendor keeps earlier contact details
        let again = ParsedInvoice {
            supplier_name: Some("Sysco".into()),
            vendor: ParsedVendor {
                name: Some("SYSCO".into()),
                fax: Some("555-0199".into()),
                ..Default::default()
            },
            items: vec![line("Brand New Sauce", None, 1, dec!(2), dec!(2))],
            ..Default::default()
        };
        let second = service.commit(again).await.unwrap();
        assert_eq!(second.vendor_id, result.vendor_id);
        let vendor = vendor::Entity::find().one(&*db).await.unwrap().unwrap();
        assert_eq!(vendor.email.as_deref(), Some("ar@sysco.test"));
        assert_eq!(vendor.fax.as_deref(), Some("555-0199"));

        let history = service.history(None).await.unwrap();
        assert_eq!(history.len(), 2);
        let first = service.get(result.invoice_id).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.invoice.invoice_date, NaiveDate::from_ymd_opt(2024, 5, 1));
    }
}
