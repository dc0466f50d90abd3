use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::db::contains_ci;
use crate::entities::tenant::{
    order_item, product, purchase_order_item, sale_item,
    stock_movement::{self, MovementType},
};
use crate::errors::ServiceError;

fn non_negative_money(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}

/// Takes `quantity` units off a product only when enough are on hand.
/// Returns false when the guard rejected the decrement.
pub(crate) async fn decrement_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<bool, ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Puts `quantity` units back on a product in a single statement, refusing
/// to push the count past `i32::MAX`.
pub(crate) async fn increment_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.lte(i32::MAX.saturating_sub(quantity)))
        .exec(conn)
        .await?;
    if result.rows_affected > 0 {
        return Ok(());
    }
    match product::Entity::find_by_id(product_id).one(conn).await? {
        Some(p) => Err(ServiceError::ValidationError(format!(
            "Adding {} units to {} would exceed the stock limit",
            quantity, p.name
        ))),
        None => Err(ServiceError::not_found("Product", product_id)),
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    pub description: Option<String>,
    #[validate(custom = "non_negative_money")]
    pub cost_price: Decimal,
    #[validate(custom = "non_negative_money")]
    pub selling_price: Decimal,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub stock: i32,
    #[validate(range(min = 0))]
    pub reorder_level: Option<i32>,
    pub image_url: Option<String>,
    pub global_product_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "non_negative_money")]
    pub cost_price: Option<Decimal>,
    #[validate(custom = "non_negative_money")]
    pub selling_price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub reorder_level: Option<i32>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    /// Signed change in units
    pub delta: i32,
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ProductQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub search: Option<String>,
    pub category: Option<String>,
}

pub struct ProductPage {
    pub items: Vec<product::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Store inventory items
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: ProductQuery) -> Result<ProductPage, ServiceError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 200);

        let mut condition = Condition::all();
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            condition = condition.add(
                Condition::any()
                    .add(contains_ci(product::Column::Name, search))
                    .add(contains_ci(product::Column::Sku, search))
                    .add(contains_ci(product::Column::Barcode, search)),
            );
        }
        if let Some(category) = query.category.as_deref().filter(|c| !c.trim().is_empty()) {
            condition = condition.add(product::Column::Category.eq(category.trim()));
        }

        let paginator = product::Entity::find()
            .filter(condition)
            .order_by_asc(product::Column::Name)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok(ProductPage {
            items,
            total,
            page,
            per_page,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    async fn ensure_sku_free(&self, sku: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = product::Entity::find().filter(product::Column::Sku.eq(sku));
        if let Some(id) = except {
            query = query.filter(product::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!("SKU {} is already in use", sku)));
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: CreateProductRequest) -> Result<product::Model, ServiceError> {
        request.validate()?;
        if let Some(sku) = request.sku.as_deref() {
            self.ensure_sku_free(sku, None).await?;
        }

        let txn = self.db.begin().await?;
        let created = product::ActiveModel {
            global_product_id: Set(request.global_product_id),
            name: Set(request.name.trim().to_string()),
            sku: Set(request.sku),
            barcode: Set(request.barcode),
            category: Set(request.category.trim().to_string()),
            description: Set(request.description),
            cost_price: Set(request.cost_price),
            selling_price: Set(request.selling_price),
            stock: Set(request.stock),
            reorder_level: Set(request.reorder_level.unwrap_or(10)),
            image_url: Set(request.image_url),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        if created.stock > 0 {
            stock_movement::record(
                created.id,
                MovementType::Restock,
                created.stock,
                "Initial stock",
            )
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        info!(product_id = %created.id, "product created");
        Ok(created)
    }

    /// Updates catalog fields. Stock only changes through [`Self::adjust_stock`].
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: Uuid, request: UpdateProductRequest) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let existing = self.get(id).await?;
        if let Some(sku) = request.sku.as_deref() {
            self.ensure_sku_free(sku, Some(id)).await?;
        }

        let mut active = existing.into_active_model();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(sku) = request.sku {
            active.sku = Set(Some(sku));
        }
        if let Some(barcode) = request.barcode {
            active.barcode = Set(Some(barcode));
        }
        if let Some(category) = request.category {
            active.category = Set(category.trim().to_string());
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(cost) = request.cost_price {
            active.cost_price = Set(cost);
        }
        if let Some(price) = request.selling_price {
            active.selling_price = Set(price);
        }
        if let Some(level) = request.reorder_level {
            active.reorder_level = Set(level);
        }
        if let Some(url) = request.image_url {
            active.image_url = Set(Some(url));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }

        Ok(active.update(&*self.db).await?)
    }

    /// Deletes a product without sales, order or purchase history
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.get(id).await?;

        let referenced = sale_item::Entity::find()
            .filter(sale_item::Column::ProductId.eq(id))
            .count(&*self.db)
            .await?
            + order_item::Entity::find()
                .filter(order_item::Column::ProductId.eq(id))
                .count(&*self.db)
                .await?
            + purchase_order_item::Entity::find()
                .filter(purchase_order_item::Column::ProductId.eq(id))
                .count(&*self.db)
                .await?;
        if referenced > 0 {
            return Err(ServiceError::Conflict(
                "Product has sales or purchase history; deactivate it instead".into(),
            ));
        }

        product::Entity::delete_by_id(id).exec(&*self.db).await?;
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Active products below their reorder level
    pub async fn low_stock(&self) -> Result<Vec<product::Model>, ServiceError> {
        let products = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Stock)
            .all(&*self.db)
            .await?;
        Ok(products
            .into_iter()
            .filter(product::Model::is_below_reorder_level)
            .collect())
    }

    /// Applies a manual correction and records it as an ADJUSTMENT movement
    #[instrument(skip(self, request))]
    pub async fn adjust_stock(&self, id: Uuid, request: AdjustStockRequest) -> Result<product::Model, ServiceError> {
        request.validate()?;
        if request.delta == 0 {
            return Err(ServiceError::ValidationError("delta must not be zero".into()));
        }

        let txn = self.db.begin().await?;
        let existing = product::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))?;

        let new_stock = existing.stock.checked_add(request.delta).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Adjusting {} by {} would exceed the stock limit",
                existing.name, request.delta
            ))
        })?;
        if new_stock < 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "{} has {} in stock; cannot remove {}",
                existing.name,
                existing.stock,
                request.delta.unsigned_abs()
            )));
        }

        let mut active = existing.into_active_model();
        active.stock = Set(new_stock);
        let updated = active.update(&txn).await?;

        stock_movement::record(id, MovementType::Adjustment, request.delta, request.reason)
            .insert(&txn)
            .await?;
        txn.commit().await?;

        info!(product_id = %id, delta = request.delta, stock = new_stock, "stock adjusted");
        Ok(updated)
    }
}
