use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::tenant::{
    customer,
    order::{self, OrderStatus, PaymentStatus},
    order_item, payment_config, product, store_settings,
};
use crate::errors::ServiceError;
use crate::integrations::{PaymentIntent, StripeClient};
use crate::services::money;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Defaults to the product's selling price
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Vec<OrderLineRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderPaymentIntent {
    pub order_id: Uuid,
    pub payment_intent: PaymentIntent,
}

/// `ORD-YYYYMMDD-XXXXXXXX`
pub(crate) fn order_too_large() -> ServiceError {
    ServiceError::ValidationError("Order amounts are too large".into())
}

pub fn generate_order_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

/// Order total in the currency's minor unit
pub fn amount_in_cents(total: Decimal) -> Option<i64> {
    (total * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create(&self, request: CreateOrderRequest) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        for line in &request.items {
            line.validate()?;
        }

        let txn = self.db.begin().await?;
        if let Some(customer_id) = request.customer_id {
            customer::Entity::find_by_id(customer_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Customer", customer_id))?;
        }

        let mut lines = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = product::Entity::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Product", line.product_id))?;
            let unit_price = line.unit_price.unwrap_or(product.selling_price);
            let line_total = unit_price
                .checked_mul(Decimal::from(line.quantity))
                .map(money)
                .ok_or_else(order_too_large)?;
            lines.push((product.id, line.quantity, unit_price, line_total));
        }
        let total = lines
            .iter()
            .try_fold(Decimal::ZERO, |acc, (_, _, _, t)| acc.checked_add(*t))
            .ok_or_else(order_too_large)?;

        let created = order::ActiveModel {
            order_number: Set(generate_order_number()),
            customer_id: Set(request.customer_id),
            order_status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Unpaid),
            total_amount: Set(total),
            notes: Set(request.notes),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for (product_id, quantity, unit_price, line_total) in lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(created.id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                unit_price: Set(unit_price),
                line_total: Set(line_total),
            }
            .insert(&txn)
            .await?;
        }

        let detail = Self::load_detail(&txn, created).await?;
        txn.commit().await?;
        info!(order_number = %detail.order.order_number, total = %detail.order.total_amount, "order created");
        Ok(detail)
    }

    pub(crate) async fn load_detail<C: ConnectionTrait>(conn: &C, order: order::Model) -> Result<OrderDetail, ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
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

        Ok(OrderDetail {
            items: items
                .into_iter()
                .map(|i| OrderItemView {
                    id: i.id,
                    product_id: i.product_id,
                    product_name: names.get(&i.product_id).cloned(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    line_total: i.line_total,
                })
                .collect(),
            order,
        })
    }

    /// Newest first, optionally narrowed to one status
    pub async fn list(&self, status: Option<&str>) -> Result<Vec<order::Model>, ServiceError> {
        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(raw) = status.filter(|s| !s.trim().is_empty()) {
            let status = OrderStatus::parse(raw)
                .ok_or_else(|| ServiceError::BadRequest(format!("Unknown order status '{}'", raw)))?;
            query = query.filter(order::Column::OrderStatus.eq(status));
        }
        Ok(query.all(&*self.db).await?)
    }

    async fn find(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))
    }

    pub async fn get(&self, id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = self.find(id).await?;
        Self::load_detail(&*self.db, order).await
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, raw: &str) -> Result<order::Model, ServiceError> {
        let status = OrderStatus::parse(raw)
            .ok_or_else(|| ServiceError::BadRequest(format!("Unknown order status '{}'", raw)))?;
        let mut active = self.find(id).await?.into_active_model();
        active.order_status = Set(status);
        let updated = active.update(&*self.db).await?;
        info!(order_id = %id, status = ?status, "order status changed");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn update_payment_status(&self, id: Uuid, raw: &str) -> Result<order::Model, ServiceError> {
        let status = PaymentStatus::parse(raw)
            .ok_or_else(|| ServiceError::BadRequest(format!("Unknown payment status '{}'", raw)))?;
        let mut active = self.find(id).await?.into_active_model();
        active.payment_status = Set(status);
        let updated = active.update(&*self.db).await?;
        info!(order_id = %id, status = ?status, "payment status changed");
        Ok(updated)
    }

    /// Opens a Stripe PaymentIntent for the order total using the store's keys
    #[instrument(skip(self, stripe))]
    pub async fn create_payment_intent(
        &self,
        id: Uuid,
        stripe: &StripeClient,
    ) -> Result<OrderPaymentIntent, ServiceError> {
        let order = self.find(id).await?;
        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::BadRequest("Order is already paid".into()));
        }

        let config = payment_config::Entity::find()
            .one(&*self.db)
            .await?
            .filter(|c| c.is_active && !c.stripe_secret_key.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::BadRequest("Payments are not configured for this store".into())
            })?;
        let currency = store_settings::Entity::find()
            .one(&*self.db)
            .await?
            .map(|s| s.currency)
            .unwrap_or_else(|| "USD".to_string());
        let amount = amount_in_cents(order.total_amount)
            .ok_or_else(|| ServiceError::ValidationError("Order total is out of range".into()))?;

        let intent = stripe
            .create_payment_intent(
                &config.stripe_secret_key,
                amount,
                &currency,
                &[
                    ("order_id", order.id.to_string()),
                    ("order_number", order.order_number.clone()),
                ],
            )
            .await?;

        let mut active = order.into_active_model();
        active.payment_intent_id = Set(Some(intent.id.clone()));
        active.update(&*self.db).await?;

        Ok(OrderPaymentIntent {
            order_id: id,
            payment_intent: intent,
        })
    }
}
