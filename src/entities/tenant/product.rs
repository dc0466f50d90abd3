use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Store inventory item
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub global_product_id: Option<Uuid>,
    pub name: String,
    #[sea_orm(unique)]
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub category: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    /// Units on hand; never negative
    pub stock: i32,
    pub reorder_level: i32,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_below_reorder_level(&self) -> bool {
        self.stock < self.reorder_level
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
    #[sea_orm(has_many = "super::sale_item::Entity")]
    SaleItems,
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

impl Related<super::sale_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SaleItems.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut model = self;
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = model.id {
                model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = model.is_active {
                model.is_active = Set(true);
            }
            if let ActiveValue::NotSet = model.reorder_level {
                model.reorder_level = Set(10);
            }
            model.created_at = Set(now);
        }
        if let ActiveValue::Set(stock) = model.stock {
            if stock < 0 {
                return Err(DbErr::Custom(format!("stock cannot be negative ({})", stock)));
            }
        }
        model.updated_at = Set(now);
        Ok(model)
    }
}
