use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::tenant::{
    product,
    purchase_order::{self, PurchaseOrderStatus},
    purchase_order_item, vendor,
};
use crate::errors::ServiceError;
use crate::services::money;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PurchaseOrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Falls back to the product's cost price
    pub unit_cost: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PurchaseOrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PurchaseOrderDetail {
    pub id: Uuid,
    pub po_number: String,
    pub vendor_id: Uuid,
    pub vendor_name: Option<String>,
    pub status: String,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub items: Vec<PurchaseOrderItemView>,
}

/// `PO-YYYYMMDD-XXXXXXXX` with an uppercase hex suffix
pub fn generate_po_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("PO-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

fn status_label(status: PurchaseOrderStatus) -> &'static str {
    match status {
        PurchaseOrderStatus::Draft => "draft",
        PurchaseOrderStatus::Sent => "sent",
        PurchaseOrderStatus::Received => "received",
    }
}

pub struct PurchaseOrderService {
    db: Arc<DatabaseConnection>,
}

impl PurchaseOrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Writes a draft purchase order for `vendor_id`
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn create_draft(
        &self,
        vendor_id: Uuid,
        lines: Vec<PurchaseOrderLine>,
        notes: Option<String>,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "A purchase order needs at least one item".into(),
            ));
        }
        if let Some(bad) = lines.iter().find(|l| l.quantity <= 0) {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for product {} must be positive",
                bad.product_id
            )));
        }

        let txn = self.db.begin().await?;
        vendor::Entity::find_by_id(vendor_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Vendor", vendor_id))?;

        let mut priced = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = product::Entity::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Product", line.product_id))?;
            let unit_cost = line.unit_cost.unwrap_or(product.cost_price);
            let line_total = money(unit_cost * Decimal::from(line.quantity));
            priced.push((line.product_id, line.quantity, unit_cost, line_total));
        }
        let total: Decimal = priced.iter().map(|(_, _, _, t)| *t).sum();

        let order = purchase_order::ActiveModel {
            po_number: Set(generate_po_number()),
            vendor_id: Set(vendor_id),
            status: Set(PurchaseOrderStatus::Draft),
            total_amount: Set(total),
            notes: Set(notes),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for (product_id, quantity, unit_cost, line_total) in priced {
            purchase_order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(order.id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                unit_cost: Set(unit_cost),
                line_total: Set(line_total),
            }
            .insert(&txn)
            .await?;
        }

        let detail = Self::load_detail(&txn, order).await?;
        txn.commit().await?;

        info!(po_number = %detail.po_number, total = %detail.total_amount, "purchase order drafted");
        Ok(detail)
    }

    async fn load_detail<C: ConnectionTrait>(
        conn: &C,
        order: purchase_order::Model,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let items = purchase_order_item::Entity::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(order.id))
            .all(conn)
            .await?;
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let names: HashMap<Uuid, String> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        let vendor_name = vendor::Entity::find_by_id(order.vendor_id)
            .one(conn)
            .await?
            .map(|v| v.name);

        Ok(PurchaseOrderDetail {
            id: order.id,
            po_number: order.po_number,
            vendor_id: order.vendor_id,
            vendor_name,
            status: status_label(order.status).to_string(),
            total_amount: order.total_amount,
            notes: order.notes,
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|i| PurchaseOrderItemView {
                    id: i.id,
                    product_id: i.product_id,
                    product_name: names.get(&i.product_id).cloned(),
                    quantity: i.quantity,
                    unit_cost: i.unit_cost,
                    line_total: i.line_total,
                })
                .collect(),
        })
    }

    pub async fn list(&self) -> Result<Vec<purchase_order::Model>, ServiceError> {
        Ok(purchase_order::Entity::find()
            .order_by_desc(purchase_order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<PurchaseOrderDetail, ServiceError> {
        let order = purchase_order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Purchase order", id))?;
        Self::load_detail(&*self.db, order).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{seed_product, seed_vendor, store_db};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn po_numbers_have_date_and_hex_suffix() {
        let number = generate_po_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "PO");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[tokio::test]
    async fn draft_uses_product_cost_when_unit_cost_missing() {
        let (_dir, db) = store_db().await;
        let vendor = seed_vendor(&db, "Acme").await;
        let rice = seed_product(&db, "Rice", 2, dec!(3.00), dec!(4.50)).await;
        let beans = seed_product(&db, "Beans", 2, dec!(1.00), dec!(1.80)).await;

        let service = PurchaseOrderService::new(db);
        let po = service
            .create_draft(
                vendor.id,
                vec![
                    PurchaseOrderLine { product_id: rice.id, quantity: 10, unit_cost: None },
                    PurchaseOrderLine { product_id: beans.id, quantity: 4, unit_cost: Some(dec!(0.75)) },
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(po.status, "draft");
        assert_eq!(po.total_amount.round_dp(2), dec!(33.00));
        assert_eq!(po.items.len(), 2);
        assert_eq!(po.vendor_name.as_deref(), Some("Acme"));

        let reloaded = service.get(po.id).await.unwrap();
        assert_eq!(reloaded.po_number, po.po_number);
    }

    #[tokio::test]
    async fn unknown_vendor_is_not_found() {
        let (_dir, db) = store_db().await;
        let rice = seed_product(&db, "Rice", 2, dec!(3.00), dec!(4.50)).await;
        let service = PurchaseOrderService::new(db);
        let result = service
            .create_draft(
                Uuid::new_v4(),
                vec![PurchaseOrderLine { product_id: rice.id, quantity: 1, unit_cost: None }],
                None,
            )
            .await;
        assert_matches!(result, Err(ServiceError::NotFound(_)));
    }
}
