//! Supplier-side order workspace: retailer purchase orders, versioned quotes and
//! the logistics estimator. Held in memory only.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use strum::{Display, EnumString};
use tokio::sync::RwLock;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;

pub const QUOTE_TAX_RATE: Decimal = dec!(0.08);
/// Below this many units an order ships in boxes
pub const PALLET_THRESHOLD: u32 = 50;
pub const UNITS_PER_BOX: u32 = 12;
pub const UNITS_PER_PALLET: u32 = 100;
pub const DEFAULT_QUOTE_NOTE: &str = "Updated Quote";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderType {
    DirectPo,
    MarketplaceRfq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SupplierOrderStatus {
    Pending,
    Negotiating,
    QuoteSent,
    Confirmed,
    Shipped,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogisticsMode {
    Box,
    Pallet,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
pub struct EstimateLine {
    pub confirmed_qty: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EstimateRequest {
    pub items: Vec<EstimateLine>,
    #[serde(default)]
    pub shipping: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QuoteEstimate {
    pub total_units: u64,
    pub logistics_mode: LogisticsMode,
    /// Box count in box mode, pallet fill percentage in pallet mode
    pub logistics_metric: u32,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

fn amount_too_large() -> ServiceError {
    ServiceError::ValidationError("Quote amounts are too large".into())
}

/// Packing and totals calculation for a set of quote lines.
/// Fails instead of overflowing on absurd quantities or prices.
pub fn estimate(items: &[EstimateLine], shipping: Decimal) -> Result<QuoteEstimate, ServiceError> {
    let total_units = items
        .iter()
        .try_fold(0u64, |acc, i| acc.checked_add(u64::from(i.confirmed_qty)))
        .ok_or_else(amount_too_large)?;
    let (logistics_mode, logistics_metric) = if total_units < u64::from(PALLET_THRESHOLD) {
        let boxes = total_units.div_ceil(u64::from(UNITS_PER_BOX));
        (LogisticsMode::Box, u32::try_from(boxes).unwrap_or(u32::MAX))
    } else {
        let fill = Decimal::from(total_units) / Decimal::from(UNITS_PER_PALLET) * Decimal::ONE_HUNDRED;
        let metric = fill
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u32()
            .unwrap_or(u32::MAX);
        (LogisticsMode::Pallet, metric)
    };

    let subtotal = items
        .iter()
        .try_fold(Decimal::ZERO, |acc, i| {
            Decimal::from(i.confirmed_qty)
                .checked_mul(i.unit_price)
                .and_then(|line| acc.checked_add(line))
        })
        .ok_or_else(amount_too_large)?;
    let tax = subtotal.checked_mul(QUOTE_TAX_RATE).ok_or_else(amount_too_large)?;
    let total = subtotal
        .checked_add(tax)
        .and_then(|t| t.checked_add(shipping))
        .ok_or_else(amount_too_large)?;
    Ok(QuoteEstimate {
        total_units,
        logistics_mode,
        logistics_metric,
        subtotal,
        tax,
        shipping,
        total,
    })
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QuoteLineInput {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub requested_qty: u32,
    pub confirmed_qty: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QuoteLineItem {
    pub id: String,
    pub name: String,
    pub sku: String,
    pub requested_qty: u32,
    pub confirmed_qty: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl QuoteLineItem {
    pub fn new(id: &str, name: &str, sku: &str, qty: u32, unit_price: Decimal) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            sku: sku.to_string(),
            requested_qty: qty,
            confirmed_qty: qty,
            unit_price,
            total: Decimal::from(qty) * unit_price,
        }
    }

    fn as_estimate_line(&self) -> EstimateLine {
        EstimateLine {
            confirmed_qty: self.confirmed_qty,
            unit_price: self.unit_price,
        }
    }
}

impl From<QuoteLineInput> for QuoteLineItem {
    fn from(input: QuoteLineInput) -> Self {
        Self {
            id: input.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            total: Decimal::from(input.confirmed_qty) * input.unit_price,
            name: input.name,
            sku: input.sku,
            requested_qty: input.requested_qty,
            confirmed_qty: input.confirmed_qty,
            unit_price: input.unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ContractTerms {
    pub payment_terms: String,
    pub shipping_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuoteVersion {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub items: Vec<QuoteLineItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub payment_terms: String,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SupplierOrder {
    pub id: String,
    pub po_number: String,
    pub retailer_name: String,
    pub retailer_id: String,
    pub order_type: OrderType,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub required_date: DateTime<Utc>,
    pub status: SupplierOrderStatus,
    pub logistics_mode: LogisticsMode,
    pub logistics_metric: u32,
    pub items: Vec<QuoteLineItem>,
    pub contract_terms: ContractTerms,
    /// Newest first
    pub quote_history: Vec<QuoteVersion>,
}

impl SupplierOrder {
    pub fn estimate(&self) -> Result<QuoteEstimate, ServiceError> {
        let lines: Vec<EstimateLine> = self.items.iter().map(QuoteLineItem::as_estimate_line).collect();
        estimate(&lines, self.contract_terms.shipping_rate)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SendQuoteRequest {
    pub items: Vec<QuoteLineInput>,
    #[serde(default)]
    pub shipping_rate: Decimal,
    pub payment_terms: String,
    pub note: Option<String>,
}

fn seed_orders(now: DateTime<Utc>) -> Vec<SupplierOrder> {
    let mut direct = SupplierOrder {
        id: "ord-001".into(),
        po_number: "PO-2023-088".into(),
        retailer_name: "Downtown Market".into(),
        retailer_id: "ret-001".into(),
        order_type: OrderType::DirectPo,
        created_at: now - Duration::days(2),
        last_updated: now - Duration::days(2),
        required_date: now + Duration::days(7),
        status: SupplierOrderStatus::Pending,
        logistics_mode: LogisticsMode::Box,
        logistics_metric: 0,
        items: vec![
            QuoteLineItem::new("item-1", "Heinz Ketchup", "HNZ-KET-001", 20, dec!(45.00)),
            QuoteLineItem::new("item-2", "Coca-Cola Classic", "COKE-CLS-024", 50, dec!(18.50)),
        ],
        contract_terms: ContractTerms {
            payment_terms: "Net 30".into(),
            shipping_rate: dec!(50),
        },
        quote_history: Vec::new(),
    };

    let mut rfq = SupplierOrder {
        id: "ord-002".into(),
        po_number: "RFQ-AUTO-992".into(),
        retailer_name: "Green Earth Organics".into(),
        retailer_id: "ret-002".into(),
        order_type: OrderType::MarketplaceRfq,
        created_at: now - Duration::days(1),
        last_updated: now - Duration::hours(6),
        required_date: now + Duration::days(10),
        status: SupplierOrderStatus::Negotiating,
        logistics_mode: LogisticsMode::Box,
        logistics_metric: 0,
        items: vec![QuoteLineItem::new("item-3", "Chobani Greek Yogurt", "CHB-GRK-032", 100, dec!(32.00))],
        contract_terms: ContractTerms {
            payment_terms: "COD".into(),
            shipping_rate: dec!(150),
        },
        quote_history: Vec::new(),
    };

    for order in [&mut direct, &mut rfq] {
        if let Ok(est) = order.estimate() {
            order.logistics_mode = est.logistics_mode;
            order.logistics_metric = est.logistics_metric;
        }
    }

    if let Ok(est) = rfq.estimate() {
        rfq.quote_history.push(QuoteVersion {
            version: 1,
            created_at: rfq.created_at,
            items: rfq.items.clone(),
            subtotal: est.subtotal,
            tax: est.tax,
            shipping: est.shipping,
            total: est.total,
            payment_terms: rfq.contract_terms.payment_terms.clone(),
            note: "Initial Quote".into(),
        });
    }

    vec![direct, rfq]
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// In-memory store of supplier orders shared across requests
pub struct QuoteBook {
    orders: RwLock<Vec<SupplierOrder>>,
}

impl Default for QuoteBook {
    fn default() -> Self {
        Self::seeded()
    }
}

impl QuoteBook {
    pub fn new(orders: Vec<SupplierOrder>) -> Self {
        Self {
            orders: RwLock::new(orders),
        }
    }

    pub fn seeded() -> Self {
        Self::new(seed_orders(Utc::now()))
    }

    pub async fn list_orders(&self) -> Vec<SupplierOrder> {
        self.orders.read().await.clone()
    }

    pub async fn get_order(&self, id: &str) -> Result<SupplierOrder, ServiceError> {
        self.orders
            .read()
            .await
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("SupplierOrder", id))
    }

    #[instrument(skip(self, request), fields(order_id = %id))]
    pub async fn send_quote(&self, id: &str, request: SendQuoteRequest) -> Result<SupplierOrder, ServiceError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| ServiceError::not_found("SupplierOrder", id))?;

        let lines: Vec<EstimateLine> = request
            .items
            .iter()
            .map(|i| EstimateLine {
                confirmed_qty: i.confirmed_qty,
                unit_price: i.unit_price,
            })
            .collect();
        // line totals cannot overflow once the estimate succeeded
        let est = estimate(&lines, request.shipping_rate)?;
        let items: Vec<QuoteLineItem> = request.items.into_iter().map(QuoteLineItem::from).collect();
        let now = Utc::now();
        let version = order.quote_history.len() as u32 + 1;

        order.quote_history.insert(
            0,
            QuoteVersion {
                version,
                created_at: now,
                items: items.clone(),
                subtotal: est.subtotal,
                tax: est.tax,
                shipping: est.shipping,
                total: est.total,
                payment_terms: request.payment_terms.clone(),
                note: request
                    .note
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_QUOTE_NOTE.to_string()),
            },
        );
        order.items = items;
        order.contract_terms = ContractTerms {
            payment_terms: request.payment_terms,
            shipping_rate: request.shipping_rate,
        };
        order.logistics_mode = est.logistics_mode;
        order.logistics_metric = est.logistics_metric;
        order.status = SupplierOrderStatus::QuoteSent;
        order.last_updated = now;

        info!(version, total = %est.total, "quote sent");
        Ok(order.clone())
    }

    pub async fn confirm_order(&self, id: &str) -> Result<SupplierOrder, ServiceError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| ServiceError::not_found("SupplierOrder", id))?;
        order.status = SupplierOrderStatus::Confirmed;
        order.last_updated = Utc::now();
        info!(order_id = %id, "supplier order confirmed");
        Ok(order.clone())
    }

    pub async fn export_csv(&self, id: &str) -> Result<String, ServiceError> {
        let order = self.get_order(id).await?;
        let est = order.estimate()?;
        let mut out = String::from("Item,SKU,Requested Qty,Confirmed Qty,Unit Price,Total\n");
        for item in &order.items {
            let _ = writeln!(
                out,
                "{},{},{},{},{:.2},{:.2}",
                csv_field(&item.name),
                csv_field(&item.sku),
                item.requested_qty,
                item.confirmed_qty,
                item.unit_price,
                item.total
            );
        }
        let _ = writeln!(out, "Subtotal,,,,,{:.2}", est.subtotal);
        let _ = writeln!(out, "Tax,,,,,{:.2}", est.tax);
        let _ = writeln!(out, "Total,,,,,{:.2}", est.total);
        Ok(out)
    }
}

/// One supplier workspace per store, seeded the first time a store opens it
#[derive(Default)]
pub struct QuoteBooks {
    books: DashMap<String, Arc<QuoteBook>>,
}

impl QuoteBooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_store(&self, subdomain: &str) -> Arc<QuoteBook> {
        self.books
            .entry(subdomain.to_string())
            .or_insert_with(|| Arc::new(QuoteBook::seeded()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn line(confirmed_qty: u32, unit_price: Decimal) -> EstimateLine {
        EstimateLine {
            confirmed_qty,
            unit_price,
        }
    }

    #[test]
    fn worked_example_ships_on_a_pallet() {
        let est = estimate(&[line(20, dec!(45.00)), line(50, dec!(18.50))], dec!(50)).unwrap();
        assert_eq!(est.subtotal, dec!(1825.00));
        assert_eq!(est.tax, dec!(146.00));
        assert_eq!(est.total, dec!(2021.00));
        assert_eq!(est.logistics_mode, LogisticsMode::Pallet);
        assert_eq!(est.logistics_metric, 70);
    }

    #[test]
    fn small_orders_count_boxes() {
        let est = estimate(&[line(13, dec!(1))], Decimal::ZERO).unwrap();
        assert_eq!(est.logistics_mode, LogisticsMode::Box);
        assert_eq!(est.logistics_metric, 2);
        assert_eq!(estimate(&[], Decimal::ZERO).unwrap().logistics_metric, 0);
    }

    #[test]
    fn huge_quantities_stay_on_pallets() {
        let est = estimate(&[line(u32::MAX, dec!(0)), line(1, dec!(0))], Decimal::ZERO).unwrap();
        assert_eq!(est.total_units, u64::from(u32::MAX) + 1);
        assert_eq!(est.logistics_mode, LogisticsMode::Pallet);
        assert_eq!(est.logistics_metric, u32::MAX);
    }

    #[test]
    fn overflowing_amounts_are_rejected() {
        assert_matches!(
            estimate(&[line(u32::MAX, Decimal::MAX)], Decimal::ZERO),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            estimate(&[line(1, Decimal::MAX)], Decimal::MAX),
            Err(ServiceError::ValidationError(_))
        );
    }

    proptest! {
        #[test]
        fn totals_and_mode_hold(
            lines in prop::collection::vec((0u32..200, 0i64..100_000), 0..8),
            shipping in 0i64..50_000,
        ) {
            let items: Vec<EstimateLine> = lines
                .iter()
                .map(|(q, cents)| line(*q, Decimal::new(*cents, 2)))
                .collect();
            let shipping = Decimal::new(shipping, 2);
            let est = estimate(&items, shipping).unwrap();
            prop_assert_eq!(est.tax, est.subtotal * QUOTE_TAX_RATE);
            prop_assert_eq!(est.subtotal + est.tax + est.shipping, est.total);
            let units: u32 = lines.iter().map(|(q, _)| *q).sum();
            let expected = if units < PALLET_THRESHOLD { LogisticsMode::Box } else { LogisticsMode::Pallet };
            prop_assert_eq!(est.logistics_mode, expected);
        }
    }

    #[tokio::test]
    async fn seeds_are_loaded() {
        let book = QuoteBook::seeded();
        let orders = book.list_orders().await;
        assert_eq!(orders.len(), 2);
        let rfq = book.get_order("ord-002").await.unwrap();
        assert_eq!(rfq.status, SupplierOrderStatus::Negotiating);
        assert_eq!(rfq.quote_history.len(), 1);
        assert_matches!(book.get_order("ord-404").await, Err(ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn send_quote_versions_history_newest_first() {
        let book = QuoteBook::seeded();
        let updated = book
            .send_quote(
                "ord-002",
                SendQuoteRequest {
                    items: vec![QuoteLineInput {
                        id: None,
                        name: "Chobani Greek Yogurt".into(),
                        sku: "CHB-GRK-032".into(),
                        requested_qty: 100,
                        confirmed_qty: 40,
                        unit_price: dec!(30),
                    }],
                    shipping_rate: dec!(25),
                    payment_terms: "Net 15".into(),
                    note: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, SupplierOrderStatus::QuoteSent);
        assert_eq!(updated.quote_history.len(), 2);
        assert_eq!(updated.quote_history[0].version, 2);
        assert_eq!(updated.quote_history[0].note, DEFAULT_QUOTE_NOTE);
        assert_eq!(updated.quote_history[0].total, dec!(1321.00));
        assert_eq!(updated.logistics_mode, LogisticsMode::Box);
        assert_eq!(updated.logistics_metric, 4);
        assert_eq!(updated.contract_terms.payment_terms, "Net 15");

        let confirmed = book.confirm_order("ord-002").await.unwrap();
        assert_eq!(confirmed.status, SupplierOrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn stores_do_not_share_a_workspace() {
        let books = QuoteBooks::new();
        books.for_store("alpha").confirm_order("ord-001").await.unwrap();

        let alpha = books.for_store("alpha").get_order("ord-001").await.unwrap();
        let beta = books.for_store("beta").get_order("ord-001").await.unwrap();
        assert_eq!(alpha.status, SupplierOrderStatus::Confirmed);
        assert_eq!(beta.status, SupplierOrderStatus::Pending);
    }

    #[tokio::test]
    async fn send_quote_rejects_overflowing_lines() {
        let book = QuoteBook::seeded();
        let result = book
            .send_quote(
                "ord-001",
                SendQuoteRequest {
                    items: vec![QuoteLineInput {
                        id: None,
                        name: "Bulk".into(),
                        sku: String::new(),
                        requested_qty: u32::MAX,
                        confirmed_qty: u32::MAX,
                        unit_price: Decimal::MAX,
                    }],
                    shipping_rate: Decimal::ZERO,
                    payment_terms: "Net 30".into(),
                    note: None,
                },
            )
            .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
        let untouched = book.get_order("ord-001").await.unwrap();
        assert!(untouched.quote_history.is_empty());
    }

    #[tokio::test]
    async fn export_lists_items_then_totals() {
        let book = QuoteBook::seeded();
        let csv = book.export_csv("ord-001").await.unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows[0], "Item,SKU,Requested Qty,Confirmed Qty,Unit Price,Total");
        assert_eq!(rows[1], "Heinz Ketchup,HNZ-KET-001,20,20,45.00,900.00");
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[5], "Total,,,,,2021.00");
    }
}
