use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::{contains_ci, equals_ci};
use crate::entities::master::global_product::{self, CatalogStatus};
use crate::errors::ServiceError;

pub const DEFAULT_SEARCH_LIMIT: u64 = 5;
pub const MAX_SEARCH_LIMIT: u64 = 20;
pub const DEFAULT_LIST_LIMIT: u64 = 50;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCatalogProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub product_name: String,
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    #[validate(length(min = 6, max = 14))]
    pub upc: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub base_unit: Option<String>,
    #[validate(range(min = 1))]
    pub pack_size: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CatalogMatch {
    pub product: global_product::Model,
    pub confidence: f64,
}

/// Confidence for the n-th keyword match
fn keyword_confidence(index: usize) -> f64 {
    (0.9 - index as f64 * 0.1).max(0.5)
}

/// Shared product catalog in the master database
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Exact name, then exact UPC, then all-keywords match on the name.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: Option<u64>) -> Result<Vec<CatalogMatch>, ServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);

        let exact = global_product::Entity::find()
            .filter(equals_ci(global_product::Column::ProductName, query))
            .one(&*self.db)
            .await?;
        if let Some(product) = exact {
            return Ok(vec![CatalogMatch {
                product,
                confidence: 1.0,
            }]);
        }

        let by_upc = global_product::Entity::find()
            .filter(global_product::Column::Upc.eq(query))
            .one(&*self.db)
            .await?;
        if let Some(product) = by_upc {
            return Ok(vec![CatalogMatch {
                product,
                confidence: 1.0,
            }]);
        }

        let condition = query
            .split_whitespace()
            .fold(Condition::all(), |cond, keyword| {
                cond.add(contains_ci(global_product::Column::ProductName, keyword))
            });
        let matches = global_product::Entity::find()
            .filter(condition)
            .order_by_asc(global_product::Column::ProductName)
            .limit(limit)
            .all(&*self.db)
            .await?;

        Ok(matches
            .into_iter()
            .enumerate()
            .map(|(idx, product)| CatalogMatch {
                product,
                confidence: keyword_confidence(idx),
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn list(&self, limit: Option<u64>, offset: Option<u64>) -> Result<Vec<global_product::Model>, ServiceError> {
        Ok(global_product::Entity::find()
            .order_by_asc(global_product::Column::ProductName)
            .limit(limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500))
            .offset(offset.unwrap_or(0))
            .all(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<global_product::Model, ServiceError> {
        global_product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Catalog product", id))
    }

    /// Adds a catalog entry. Submissions from stores wait for review.
    #[instrument(skip(self, request), fields(name = %request.product_name))]
    pub async fn create(
        &self,
        request: CreateCatalogProductRequest,
        approved: bool,
    ) -> Result<global_product::Model, ServiceError> {
        request.validate()?;

        if let Some(upc) = request.upc.as_deref() {
            let taken = global_product::Entity::find()
                .filter(global_product::Column::Upc.eq(upc))
                .one(&*self.db)
                .await?
                .is_some();
            if taken {
                return Err(ServiceError::Conflict(format!("UPC {} already exists", upc)));
            }
        }

        let status = if approved {
            CatalogStatus::Active
        } else {
            CatalogStatus::Pending
        };
        let created = global_product::ActiveModel {
            product_name: Set(request.product_name.trim().to_string()),
            brand: Set(request.brand),
            manufacturer: Set(request.manufacturer),
            category: Set(request.category),
            subcategory: Set(request.subcategory),
            upc: Set(request.upc),
            image_url: Set(request.image_url),
            description: Set(request.description),
            base_unit: Set(request.base_unit.unwrap_or_else(|| "piece".to_string())),
            pack_size: Set(request.pack_size.unwrap_or(1)),
            status: Set(status),
            metadata_json: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(id = %created.id, status = ?created.status, "catalog product created");
        Ok(created)
    }
}
