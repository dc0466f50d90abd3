//! Customer-facing storefront: browse what is in stock and check out.
//! Checkout creates an order and takes the units off the shelf in one
//! transaction.

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::db::{contains_ci, equals_ci};
use crate::entities::tenant::{
    customer,
    order::{self, OrderStatus, PaymentStatus},
    order_item, product,
    stock_movement::{self, MovementType},
};
use crate::errors::ServiceError;
use crate::services::money;
use crate::services::orders::{generate_order_number, order_too_large, OrderDetail, OrderService};
use crate::services::products::decrement_stock;

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
pub struct ShopQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    /// Defaults to true
    pub in_stock_only: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShopProduct {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub in_stock: bool,
}

impl From<product::Model> for ShopProduct {
    fn from(p: product::Model) -> Self {
        Self {
            id: p.id,
            in_stock: p.stock > 0,
            name: p.name,
            category: p.category,
            description: p.description,
            image_url: p.image_url,
            price: p.selling_price,
            stock: p.stock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "Cart is empty"))]
    pub items: Vec<CheckoutItem>,
    pub delivery_address: Option<String>,
    /// Free text, `cash` when omitted
    pub payment_method: Option<String>,
}

/// The shopper placing an order
#[derive(Debug, Clone)]
pub struct Shopper {
    pub name: Option<String>,
    pub email: Option<String>,
}

fn checkout_notes(request: &CheckoutRequest) -> String {
    let payment = request
        .payment_method
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("cash");
    let mut notes = format!("Online order, payment: {}", payment);
    if let Some(address) = request
        .delivery_address
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
    {
        notes.push_str("\nDeliver to: ");
        notes.push_str(address);
    }
    notes
}

pub struct ShopService {
    db: Arc<DatabaseConnection>,
}

impl ShopService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Active products, by name
    pub async fn products(&self, query: &ShopQuery) -> Result<Vec<ShopProduct>, ServiceError> {
        let mut select = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name);
        if query.in_stock_only.unwrap_or(true) {
            select = select.filter(product::Column::Stock.gt(0));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(contains_ci(product::Column::Name, search))
                    .add(contains_ci(product::Column::Description, search)),
            );
        }
        if let Some(category) = query.category.as_deref().filter(|c| !c.trim().is_empty()) {
            select = select.filter(equals_ci(product::Column::Category, category));
        }
        Ok(select
            .all(&*self.db)
            .await?
            .into_iter()
            .map(ShopProduct::from)
            .collect())
    }

    /// Categories with at least one product on the shelf, alphabetically
    pub async fn categories(&self) -> Result<Vec<CategoryCount>, ServiceError> {
        let products = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::Stock.gt(0))
            .all(&*self.db)
            .await?;
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for p in products {
            let name = match p.category.trim() {
                "" => "Uncategorized".to_string(),
                other => other.to_string(),
            };
            *counts.entry(name).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(name, count)| CategoryCount { name, count })
            .collect())
    }

    /// Finds the shopper's customer record by email, creating it on first order
    async fn customer_for(
        txn: &sea_orm::DatabaseTransaction,
        shopper: &Shopper,
    ) -> Result<Option<Uuid>, ServiceError> {
        let Some(email) = shopper.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) else {
            return Ok(None);
        };
        if let Some(existing) = customer::Entity::find()
            .filter(equals_ci(customer::Column::Email, email))
            .one(txn)
            .await?
        {
            return Ok(Some(existing.id));
        }
        let created = customer::ActiveModel {
            full_name: Set(shopper.name.clone().unwrap_or_else(|| email.to_string())),
            email: Set(Some(email.to_lowercase())),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        Ok(Some(created.id))
    }

    #[instrument(skip(self, request, shopper), fields(items = request.items.len()))]
    pub async fn checkout(&self, shopper: &Shopper, request: CheckoutRequest) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let txn = self.db.begin().await?;
        let customer_id = Self::customer_for(&txn, shopper).await?;

        let mut lines = Vec::with_capacity(request.items.len());
        let mut total = Decimal::ZERO;
        for item in &request.items {
            let product = product::Entity::find_by_id(item.product_id)
                .filter(product::Column::IsActive.eq(true))
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Product", item.product_id))?;
            let line_total = product
                .selling_price
                .checked_mul(Decimal::from(item.quantity))
                .map(money)
                .ok_or_else(order_too_large)?;
            total = total
                .checked_add(line_total)
                .ok_or_else(order_too_large)?;
            lines.push((product, item.quantity, line_total));
        }

        let order_number = generate_order_number();
        let created = order::ActiveModel {
            order_number: Set(order_number.clone()),
            customer_id: Set(customer_id),
            order_status: Set(OrderStatus::Processing),
            payment_status: Set(PaymentStatus::Unpaid),
            total_amount: Set(total),
            notes: Set(Some(checkout_notes(&request))),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for (product, quantity, line_total) in lines {
            if !decrement_stock(&txn, product.id, quantity).await? {
                warn!(product_id = %product.id, "checkout rejected for insufficient stock");
                return Err(ServiceError::InsufficientStock(format!(
                    "Not enough {} in stock for {} units",
                    product.name, quantity
                )));
            }
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(created.id),
                product_id: Set(product.id),
                quantity: Set(quantity),
                unit_price: Set(product.selling_price),
                line_total: Set(line_total),
            }
            .insert(&txn)
            .await?;
            stock_movement::record(
                product.id,
                MovementType::Online,
                -quantity,
                format!("Order {}", order_number),
            )
            .insert(&txn)
            .await?;
        }

        let detail = OrderService::load_detail(&txn, created).await?;
        txn.commit().await?;

        metrics::counter!("retailos_shop.checkouts", 1);
        info!(order_number = %detail.order.order_number, total = %detail.order.total_amount, "storefront checkout");
        Ok(detail)
    }
}
