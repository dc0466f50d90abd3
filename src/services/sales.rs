use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::equals_ci;
use crate::entities::tenant::{
    pos_mapping, product,
    sale::{self, PaymentMethod, SaleStatus},
    sale_item,
    stock_movement::{self, MovementType},
    store_settings,
};
use crate::errors::ServiceError;
use crate::integrations::ai::{DocumentReader, ImageUpload, ZReportItem};
use crate::services::money;
use crate::services::products::{decrement_stock, increment_stock};
use crate::services::settings::DEFAULT_TAX_RATE;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SaleLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Defaults to the product's selling price
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateSaleRequest {
    #[validate(length(min = 1, message = "a sale needs at least one item"))]
    pub items: Vec<SaleLineRequest>,
    pub customer_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub discount: Option<Decimal>,
    /// Defaults to the sale total
    pub amount_paid: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaleItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaleDetail {
    #[serde(flatten)]
    pub sale: sale::Model,
    pub items: Vec<SaleItemView>,
}

/// One sold line reported by a POS sync
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct SoldItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProcessSalesRequest {
    pub items: Vec<SoldItem>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessSalesResult {
    pub items_deducted: usize,
    pub total_revenue: Decimal,
    pub items_skipped: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ZReportResult {
    #[serde(flatten)]
    pub processed: ProcessSalesResult,
    pub items_read: usize,
    pub unresolved: Vec<ZReportItem>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub sale_count: usize,
    pub items_sold: i64,
    pub revenue: Decimal,
    pub tax: Decimal,
}

/// Line totals for a basket; `tax` applies after the discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

pub fn compute_totals(subtotal: Decimal, discount: Decimal, tax_rate: Decimal) -> SaleTotals {
    let taxable = (subtotal - discount).max(Decimal::ZERO);
    let tax = money(taxable * tax_rate);
    SaleTotals {
        subtotal: money(subtotal),
        tax,
        total: money(taxable + tax),
    }
}

fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// Point-of-sale transactions and POS sync
pub struct SaleService {
    db: Arc<DatabaseConnection>,
}

impl SaleService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn next_sale_number<C: ConnectionTrait>(conn: &C) -> Result<String, ServiceError> {
        let mut millis = Utc::now().timestamp_millis();
        loop {
            let candidate = format!("SALE-{}", millis);
            let taken = sale::Entity::find()
                .filter(sale::Column::SaleNumber.eq(candidate.as_str()))
                .one(conn)
                .await?
                .is_some();
            if !taken {
                return Ok(candidate);
            }
            millis += 1;
        }
    }

    /// Records a sale and takes its items out of stock in one transaction
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_sale(
        &self,
        request: CreateSaleRequest,
        cashier_id: Option<Uuid>,
    ) -> Result<SaleDetail, ServiceError> {
        request.validate()?;
        for line in &request.items {
            line.validate()?;
        }
        let discount = request.discount.unwrap_or(Decimal::ZERO);
        if discount.is_sign_negative() {
            return Err(ServiceError::ValidationError("discount must not be negative".into()));
        }

        let txn = self.db.begin().await?;

        let tax_rate = store_settings::Entity::find()
            .one(&txn)
            .await?
            .map(|s| s.tax_rate)
            .unwrap_or(DEFAULT_TAX_RATE);

        let mut priced = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = product::Entity::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Product", line.product_id))?;
            let unit_price = line.unit_price.unwrap_or(product.selling_price);
            priced.push((product, line.quantity, unit_price));
        }
        let subtotal = priced
            .iter()
            .try_fold(Decimal::ZERO, |acc, (_, qty, price)| {
                price
                    .checked_mul(Decimal::from(*qty))
                    .and_then(|line| acc.checked_add(line))
            })
            .ok_or_else(|| ServiceError::ValidationError("Sale amounts are too large".into()))?;
        if discount > subtotal {
            return Err(ServiceError::ValidationError(
                "discount cannot exceed the subtotal".into(),
            ));
        }
        let totals = compute_totals(subtotal, discount, tax_rate);
        let amount_paid = request.amount_paid.unwrap_or(totals.total);
        if amount_paid < totals.total {
            return Err(ServiceError::ValidationError(format!(
                "Amount paid {} is less than the total {}",
                amount_paid, totals.total
            )));
        }

        let sale_number = Self::next_sale_number(&txn).await?;
        let created = sale::ActiveModel {
            sale_number: Set(sale_number.clone()),
            user_id: Set(cashier_id),
            customer_id: Set(request.customer_id),
            subtotal: Set(totals.subtotal),
            tax: Set(totals.tax),
            discount: Set(money(discount)),
            total: Set(totals.total),
            amount_paid: Set(money(amount_paid)),
            change_due: Set(money(amount_paid - totals.total)),
            payment_method: Set(request.payment_method),
            status: Set(SaleStatus::Completed),
            notes: Set(request.notes),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for (product, quantity, unit_price) in &priced {
            if !decrement_stock(&txn, product.id, *quantity).await? {
                warn!(product_id = %product.id, "sale rejected for insufficient stock");
                // earlier lines of this basket may already have taken from the same product
                let on_hand = product::Entity::find_by_id(product.id)
                    .one(&txn)
                    .await?
                    .map_or(0, |p| p.stock);
                return Err(ServiceError::InsufficientStock(format!(
                    "{} has {} units, {} requested",
                    product.name, on_hand, quantity
                )));
            }
            sale_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                sale_id: Set(created.id),
                product_id: Set(product.id),
                quantity: Set(*quantity),
                unit_price: Set(*unit_price),
                subtotal: Set(money(*unit_price * Decimal::from(*quantity))),
            }
            .insert(&txn)
            .await?;
            stock_movement::record(
                product.id,
                MovementType::Sale,
                -quantity,
                format!("Sale {}", sale_number),
            )
            .insert(&txn)
            .await?;
        }

        let detail = Self::load_detail(&txn, created).await?;
        txn.commit().await?;

        metrics::counter!("retailos_sales.created", 1);
        info!(sale_number = %detail.sale.sale_number, total = %detail.sale.total, "sale recorded");
        Ok(detail)
    }

    async fn load_detail<C: ConnectionTrait>(conn: &C, sale: sale::Model) -> Result<SaleDetail, ServiceError> {
        let items = sale_item::Entity::find()
            .filter(sale_item::Column::SaleId.eq(sale.id))
            .all(conn)
            .await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let names: HashMap<Uuid, String> = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let items = items
            .into_iter()
            .map(|i| SaleItemView {
                id: i.id,
                product_id: i.product_id,
                product_name: names.get(&i.product_id).cloned(),
                quantity: i.quantity,
                unit_price: i.unit_price,
                subtotal: i.subtotal,
            })
            .collect();
        Ok(SaleDetail { sale, items })
    }

    pub async fn list(&self, limit: Option<u64>) -> Result<Vec<sale::Model>, ServiceError> {
        Ok(sale::Entity::find()
            .order_by_desc(sale::Column::CreatedAt)
            .limit(limit.unwrap_or(100).clamp(1, 500))
            .all(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<SaleDetail, ServiceError> {
        let sale = sale::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sale", id))?;
        Self::load_detail(&*self.db, sale).await
    }

    /// Voids a completed sale and puts its items back on the shelf
    #[instrument(skip(self))]
    pub async fn cancel_sale(&self, id: Uuid) -> Result<SaleDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let existing = sale::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sale", id))?;
        if existing.status == SaleStatus::Cancelled {
            return Err(ServiceError::BadRequest(format!(
                "Sale {} is already cancelled",
                existing.sale_number
            )));
        }

        let items = sale_item::Entity::find()
            .filter(sale_item::Column::SaleId.eq(id))
            .all(&txn)
            .await?;
        for item in &items {
            increment_stock(&txn, item.product_id, item.quantity).await?;
            stock_movement::record(
                item.product_id,
                MovementType::Adjustment,
                item.quantity,
                format!("Cancelled sale {}", existing.sale_number),
            )
            .insert(&txn)
            .await?;
        }

        let mut active = existing.into_active_model();
        active.status = Set(SaleStatus::Cancelled);
        let cancelled = active.update(&txn).await?;
        let detail = Self::load_detail(&txn, cancelled).await?;
        txn.commit().await?;

        info!(sale_number = %detail.sale.sale_number, "sale cancelled");
        Ok(detail)
    }

    /// Deducts POS-reported sales from stock. Lines that are unknown or
    /// exceed the stock on hand are skipped rather than failing the batch.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn process_sales(&self, items: &[SoldItem]) -> Result<ProcessSalesResult, ServiceError> {
        let txn = self.db.begin().await?;
        let mut deducted = 0;
        let mut skipped = 0;
        let mut revenue = Decimal::ZERO;

        for item in items {
            if item.quantity <= 0 || !decrement_stock(&txn, item.product_id, item.quantity).await? {
                skipped += 1;
                continue;
            }
            stock_movement::record(
                item.product_id,
                MovementType::Zreport,
                -item.quantity,
                "POS sales sync",
            )
            .insert(&txn)
            .await?;
            deducted += 1;
            revenue += item.price * Decimal::from(item.quantity);
        }
        txn.commit().await?;

        info!(deducted, skipped, "POS sales processed");
        Ok(ProcessSalesResult {
            items_deducted: deducted,
            total_revenue: money(revenue),
            items_skipped: skipped,
            timestamp: Utc::now(),
        })
    }

    /// POS mapping by code first, then an exact product name match
    async fn resolve_product(&self, item: &ZReportItem) -> Result<Option<Uuid>, ServiceError> {
        if let Some(code) = item.code.as_deref().filter(|c| !c.trim().is_empty()) {
            let mapped = pos_mapping::Entity::find()
                .filter(pos_mapping::Column::PosCode.eq(code.trim()))
                .one(&*self.db)
                .await?
                .and_then(|m| m.product_id);
            if mapped.is_some() {
                return Ok(mapped);
            }
        }
        let by_name = pos_mapping::Entity::find()
            .filter(equals_ci(pos_mapping::Column::PosName, &item.name))
            .filter(pos_mapping::Column::ProductId.is_not_null())
            .one(&*self.db)
            .await?
            .and_then(|m| m.product_id);
        if by_name.is_some() {
            return Ok(by_name);
        }
        Ok(product::Entity::find()
            .filter(equals_ci(product::Column::Name, &item.name))
            .one(&*self.db)
            .await?
            .map(|p| p.id))
    }

    /// Reads a Z-report photo and applies it as a POS sync
    #[instrument(skip(self, reader, upload))]
    pub async fn process_z_report(
        &self,
        reader: &dyn DocumentReader,
        upload: &ImageUpload,
    ) -> Result<ZReportResult, ServiceError> {
        let lines = reader.read_z_report(upload).await?;
        let items_read = lines.len();

        let mut sold = Vec::new();
        let mut unresolved = Vec::new();
        for line in lines {
            match self.resolve_product(&line).await? {
                Some(product_id) => sold.push(SoldItem {
                    product_id,
                    quantity: line.quantity,
                    price: line.price,
                }),
                None => unresolved.push(line),
            }
        }
        if !unresolved.is_empty() {
            warn!(count = unresolved.len(), "Z-report lines without a matching product");
        }

        let processed = self.process_sales(&sold).await?;
        Ok(ZReportResult {
            processed,
            items_read,
            unresolved,
        })
    }

    pub async fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary, ServiceError> {
        let (start, end) = day_bounds(date);
        let sales = sale::Entity::find()
            .filter(sale::Column::Status.eq(SaleStatus::Completed))
            .filter(sale::Column::CreatedAt.gte(start))
            .filter(sale::Column::CreatedAt.lt(end))
            .all(&*self.db)
            .await?;
        let ids: Vec<Uuid> = sales.iter().map(|s| s.id).collect();
        let items_sold: i64 = sale_item::Entity::find()
            .filter(sale_item::Column::SaleId.is_in(ids))
            .all(&*self.db)
            .await?
            .iter()
            .map(|i| i64::from(i.quantity))
            .sum();

        Ok(DailySummary {
            date,
            sale_count: sales.len(),
            items_sold,
            revenue: money(sales.iter().map(|s| s.total).sum()),
            tax: money(sales.iter().map(|s| s.tax).sum()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::ai::MockDocumentReader;
    use crate::services::testing::{seed_product, store_db};
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn basket(product_id: Uuid, quantity: i32) -> CreateSaleRequest {
        CreateSaleRequest {
            items: vec![SaleLineRequest {
                product_id,
                quantity,
                unit_price: None,
            }],
            customer_id: None,
            payment_method: PaymentMethod::Cash,
            discount: None,
            amount_paid: None,
            notes: None,
        }
    }

    async fn stock_of(db: &DatabaseConnection, id: Uuid) -> i32 {
        product::Entity::find_by_id(id).one(db).await.unwrap().unwrap().stock
    }

    #[test]
    fn totals_apply_tax_after_discount() {
        let totals = compute_totals(dec!(100), dec!(10), dec!(0.08));
        assert_eq!(totals.subtotal, dec!(100));
        assert_eq!(totals.tax, dec!(7.20));
        assert_eq!(totals.total, dec!(97.20));
    }

    #[tokio::test]
    async fn sale_decrements_stock_and_logs_movement() {
        let (_dir, db) = store_db().await;
        let cola = seed_product(&db, "Cola", 10, dec!(0.50), dec!(1.25)).await;
        let service = SaleService::new(db.clone());

        let sale = service.create_sale(basket(cola.id, 4), None).await.unwrap();
        assert!(sale.sale.sale_number.starts_with("SALE-"));
        assert_eq!(sale.items.len(), 1);
        assert_eq!(sale.sale.subtotal.round_dp(2), dec!(5.00));
        assert_eq!(sale.sale.tax.round_dp(2), dec!(0.40));
        assert_eq!(stock_of(&db, cola.id).await, 6);

        let movement = stock_movement::Entity::find()
            .filter(stock_movement::Column::MovementType.eq(MovementType::Sale))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(movement.quantity, -4);
        assert_eq!(
            movement.description.as_deref(),
            Some(format!("Sale {}", sale.sale.sale_number).as_str())
        );
    }

    #[tokio::test]
    async fn oversold_sale_rolls_back() {
        let (_dir, db) = store_db().await;
        let cola = seed_product(&db, "Cola", 3, dec!(0.50), dec!(1.25)).await;
        let chips = seed_product(&db, "Chips", 10, dec!(0.80), dec!(2.00)).await;
        let service = SaleService::new(db.clone());

        let mut request = basket(chips.id, 2);
        request.items.push(SaleLineRequest {
            product_id: cola.id,
            quantity: 5,
            unit_price: None,
        });
        assert_matches!(
            service.create_sale(request, None).await,
            Err(ServiceError::InsufficientStock(_))
        );
        assert_eq!(stock_of(&db, chips.id).await, 10);
        assert_eq!(stock_of(&db, cola.id).await, 3);
        assert!(service.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_lines_report_what_is_left() {
        let (_dir, db) = store_db().await;
        let cola = seed_product(&db, "Cola", 5, dec!(0.50), dec!(1.25)).await;
        let service = SaleService::new(db.clone());

        let mut request = basket(cola.id, 3);
        request.items.push(SaleLineRequest {
            product_id: cola.id,
            quantity: 3,
            unit_price: None,
        });
        assert_matches!(
            service.create_sale(request, None).await,
            Err(ServiceError::InsufficientStock(msg)) if msg == "Cola has 2 units, 3 requested"
        );
        assert_eq!(stock_of(&db, cola.id).await, 5);
    }

    #[tokio::test]
    async fn cancelling_restores_stock_once() {
        let (_dir, db) = store_db().await;
        let cola = seed_product(&db, "Cola", 10, dec!(0.50), dec!(1.25)).await;
        let service = SaleService::new(db.clone());
        let sale = service.create_sale(basket(cola.id, 4), None).await.unwrap();

        let cancelled = service.cancel_sale(sale.sale.id).await.unwrap();
        assert_eq!(cancelled.sale.status, SaleStatus::Cancelled);
        assert_eq!(stock_of(&db, cola.id).await, 10);
        assert_matches!(
            service.cancel_sale(sale.sale.id).await,
            Err(ServiceError::BadRequest(_))
        );
        assert_eq!(stock_of(&db, cola.id).await, 10);
    }

    #[tokio::test]
    async fn process_sales_skips_short_and_unknown_lines() {
        let (_dir, db) = store_db().await;
        let cola = seed_product(&db, "Cola", 5, dec!(0.50), dec!(1.25)).await;
        let chips = seed_product(&db, "Chips", 1, dec!(0.80), dec!(2.00)).await;
        let service = SaleService::new(db.clone());

        let result = service
            .process_sales(&[
                SoldItem { product_id: cola.id, quantity: 2, price: dec!(1.25) },
                SoldItem { product_id: chips.id, quantity: 3, price: dec!(2.00) },
                SoldItem { product_id: Uuid::new_v4(), quantity: 1, price: dec!(9.99) },
            ])
            .await
            .unwrap();

        assert_eq!(result.items_deducted, 1);
        assert_eq!(result.items_skipped, 2);
        assert_eq!(result.total_revenue, dec!(2.50));
        assert_eq!(stock_of(&db, cola.id).await, 3);
        assert_eq!(stock_of(&db, chips.id).await, 1);
    }

    #[tokio::test]
    async fn z_report_lines_resolve_by_mapping_then_name() {
        let (_dir, db) = store_db().await;
        let cola = seed_product(&db, "Coca-Cola 330ml", 20, dec!(0.50), dec!(1.25)).await;
        let chips = seed_product(&db, "Salted Chips", 20, dec!(0.80), dec!(2.00)).await;
        pos_mapping::ActiveModel {
            pos_code: Set("0042".into()),
            pos_name: Set("COKE 330".into()),
            product_id: Set(Some(cola.id)),
            confidence: Set(0.8),
            is_verified: Set(false),
            ..Default::default()
        }
        .insert(&*db)
        .await
        .unwrap();

        let mut reader = MockDocumentReader::new();
        reader.expect_read_z_report().times(1).returning(|_| {
            Ok(vec![
                ZReportItem { code: Some("0042".into()), name: "COKE 330".into(), quantity: 6, price: dec!(1.25) },
                ZReportItem { code: None, name: "salted chips".into(), quantity: 2, price: dec!(2.00) },
                ZReportItem { code: Some("9999".into()), name: "Mystery".into(), quantity: 1, price: dec!(5) },
            ])
        });

        let upload = ImageUpload {
            image_base64: "aGVsbG8=".into(),
            mime_type: "image/png".into(),
        };
        let result = SaleService::new(db.clone())
            .process_z_report(&reader, &upload)
            .await
            .unwrap();

        assert_eq!(result.items_read, 3);
        assert_eq!(result.processed.items_deducted, 2);
        assert_eq!(result.unresolved.len(), 1);
        assert_eq!(result.unresolved[0].name, "Mystery");
        assert_eq!(stock_of(&db, cola.id).await, 14);
        assert_eq!(stock_of(&db, chips.id).await, 18);
    }

    #[tokio::test]
    async fn daily_summary_counts_only_completed_sales() {
        let (_dir, db) = store_db().await;
        let cola = seed_product(&db, "Cola", 10, dec!(0.50), dec!(1.00)).await;
        let service = SaleService::new(db.clone());
        service.create_sale(basket(cola.id, 2), None).await.unwrap();
        let voided = service.create_sale(basket(cola.id, 1), None).await.unwrap();
        service.cancel_sale(voided.sale.id).await.unwrap();

        let summary = service.daily_summary(Utc::now().date_naive()).await.unwrap();
        assert_eq!(summary.sale_count, 1);
        assert_eq!(summary.items_sold, 2);
        assert_eq!(summary.revenue.round_dp(2), dec!(2.16));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn stock_never_goes_negative(initial in 0i32..20, requests in prop::collection::vec(1i32..8, 1..6)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let (_dir, db) = store_db().await;
                let p = seed_product(&db, "Widget", initial, dec!(1), dec!(2)).await;
                let service = SaleService::new(db.clone());
                let mut expected = initial;
                for qty in requests {
                    let outcome = service.create_sale(basket(p.id, qty), None).await;
                    if qty <= expected {
                        prop_assert!(outcome.is_ok());
                        expected -= qty;
                    } else {
                        prop_assert!(matches!(outcome, Err(ServiceError::InsufficientStock(_))));
                    }
                    let stock = stock_of(&db, p.id).await;
                    prop_assert!(stock >= 0);
                    prop_assert_eq!(stock, expected);
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
