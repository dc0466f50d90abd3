use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::tenant::{product, vendor};
use crate::errors::ServiceError;
use crate::services::money;
use crate::services::purchase_orders::{PurchaseOrderLine, PurchaseOrderService};

const TOP_N: usize = 10;
const OVERSTOCK_FACTOR: i32 = 5;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub name: String,
    pub category: String,
    pub stock: i32,
    pub reorder_level: i32,
    /// `critical` below the reorder level, otherwise `ok`
    pub status: String,
}

impl From<&product::Model> for StockLevel {
    fn from(p: &product::Model) -> Self {
        Self {
            product_id: p.id,
            name: p.name.clone(),
            category: p.category.clone(),
            stock: p.stock,
            reorder_level: p.reorder_level,
            status: if p.is_below_reorder_level() { "critical" } else { "ok" }.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InventoryHealth {
    pub total_products: usize,
    pub zero_stock_count: usize,
    pub low_stock_count: usize,
    pub overstock_count: usize,
    pub health_score: i64,
    pub zero_stock: Vec<StockLevel>,
    pub low_stock: Vec<StockLevel>,
    pub overstock: Vec<StockLevel>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RestockRecommendation {
    pub product_id: Uuid,
    pub name: String,
    pub stock: i32,
    pub reorder_level: i32,
    pub recommended_quantity: i32,
    pub unit_cost: Decimal,
    pub estimated_cost: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GeneratePurchaseOrderRequest {
    pub vendor_id: Uuid,
    pub items: Vec<PurchaseOrderLine>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AutoRestockRequest {
    pub vendor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AutoRestockResult {
    pub po_id: Option<Uuid>,
    pub po_number: Option<String>,
    pub items: usize,
    pub total_amount: Decimal,
}

/// `100 - 2 per problem product`, never below zero
pub fn health_score(low: usize, zero: usize) -> i64 {
    (100 - ((low + zero) as i64) * 2).max(0)
}

/// Enough to reach twice the reorder level
pub fn recommended_quantity(stock: i32, reorder_level: i32) -> i32 {
    2 * reorder_level - stock
}

/// Stock analytics and replenishment for one store
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn active_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Stock)
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<InventoryHealth, ServiceError> {
        let products = self.active_products().await?;

        let zero: Vec<&product::Model> = products.iter().filter(|p| p.stock == 0).collect();
        let low: Vec<&product::Model> = products
            .iter()
            .filter(|p| p.stock > 0 && p.stock < p.reorder_level)
            .collect();
        let mut over: Vec<&product::Model> = products
            .iter()
            .filter(|p| p.stock > p.reorder_level * OVERSTOCK_FACTOR)
            .collect();
        over.sort_by(|a, b| b.stock.cmp(&a.stock));

        let top = |list: &[&product::Model]| -> Vec<StockLevel> {
            list.iter().take(TOP_N).map(|p| StockLevel::from(*p)).collect()
        };

        Ok(InventoryHealth {
            total_products: products.len(),
            zero_stock_count: zero.len(),
            low_stock_count: low.len(),
            overstock_count: over.len(),
            health_score: health_score(low.len(), zero.len()),
            zero_stock: top(&zero),
            low_stock: top(&low),
            overstock: top(&over),
        })
    }

    pub async fn stock_levels(&self, critical_only: bool) -> Result<Vec<StockLevel>, ServiceError> {
        let products = self.active_products().await?;
        Ok(products
            .iter()
            .filter(|p| !critical_only || p.is_below_reorder_level())
            .map(StockLevel::from)
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn restock_recommendations(&self) -> Result<Vec<RestockRecommendation>, ServiceError> {
        let products = self.active_products().await?;
        Ok(products
            .into_iter()
            .filter(product::Model::is_below_reorder_level)
            .map(|p| {
                let quantity = recommended_quantity(p.stock, p.reorder_level);
                RestockRecommendation {
                    product_id: p.id,
                    estimated_cost: money(p.cost_price * Decimal::from(quantity)),
                    unit_cost: p.cost_price,
                    recommended_quantity: quantity,
                    name: p.name,
                    stock: p.stock,
                    reorder_level: p.reorder_level,
                }
            })
            .collect())
    }

    #[instrument(skip(self, request), fields(vendor_id = %request.vendor_id))]
    pub async fn generate_purchase_order(
        &self,
        request: GeneratePurchaseOrderRequest,
    ) -> Result<crate::services::purchase_orders::PurchaseOrderDetail, ServiceError> {
        PurchaseOrderService::new(self.db.clone())
            .create_draft(request.vendor_id, request.items, request.notes)
            .await
    }

    /// Turns every restock recommendation into one draft purchase order
    #[instrument(skip(self))]
    pub async fn auto_restock(&self, vendor_id: Option<Uuid>) -> Result<AutoRestockResult, ServiceError> {
        let vendor = match vendor_id {
            Some(id) => vendor::Entity::find_by_id(id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Vendor", id))?,
            None => vendor::Entity::find()
                .order_by_asc(vendor::Column::Name)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound("No vendor found".into()))?,
        };

        let recommendations = self.restock_recommendations().await?;
        if recommendations.is_empty() {
            info!("nothing to restock");
            return Ok(AutoRestockResult {
                po_id: None,
                po_number: None,
                items: 0,
                total_amount: Decimal::ZERO,
            });
        }

        let lines = recommendations
            .iter()
            .map(|r| PurchaseOrderLine {
                product_id: r.product_id,
                quantity: r.recommended_quantity,
                unit_cost: Some(r.unit_cost),
            })
            .collect();
        let po = PurchaseOrderService::new(self.db.clone())
            .create_draft(vendor.id, lines, Some("Auto-generated restock order".into()))
            .await?;

        Ok(AutoRestockResult {
            po_id: Some(po.id),
            po_number: Some(po.po_number),
            items: po.items.len(),
            total_amount: po.total_amount,
        })
    }
}
