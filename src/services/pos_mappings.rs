use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::tenant::{pos_mapping, product};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpsertPosMappingRequest {
    #[validate(length(min = 1, max = 100))]
    pub pos_code: String,
    #[validate(length(min = 1, max = 255))]
    pub pos_name: String,
    pub product_id: Option<Uuid>,
    /// Clamped to `0..=1` on save
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct VerifyPosMappingRequest {
    /// Re-point the mapping before verifying it
    pub product_id: Option<Uuid>,
}

pub struct PosMappingService {
    db: Arc<DatabaseConnection>,
}

impl PosMappingService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn ensure_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("Product", product_id))
    }

    pub async fn list(&self) -> Result<Vec<pos_mapping::Model>, ServiceError> {
        Ok(pos_mapping::Entity::find()
            .order_by_asc(pos_mapping::Column::PosCode)
            .all(&*self.db)
            .await?)
    }

    /// Inserts a mapping or replaces the one already stored for the same POS code
    #[instrument(skip(self, request), fields(pos_code = %request.pos_code))]
    pub async fn upsert(&self, request: UpsertPosMappingRequest) -> Result<pos_mapping::Model, ServiceError> {
        request.validate()?;
        if let Some(product_id) = request.product_id {
            self.ensure_product(product_id).await?;
        }
        let code = request.pos_code.trim().to_string();
        let existing = pos_mapping::Entity::find()
            .filter(pos_mapping::Column::PosCode.eq(code.as_str()))
            .one(&*self.db)
            .await?;

        let saved = match existing {
            Some(mapping) => {
                let mut active = mapping.into_active_model();
                active.pos_name = Set(request.pos_name.trim().to_string());
                active.product_id = Set(request.product_id);
                if let Some(confidence) = request.confidence {
                    active.confidence = Set(confidence);
                }
                active.update(&*self.db).await?
            }
            None => {
                pos_mapping::ActiveModel {
                    pos_code: Set(code),
                    pos_name: Set(request.pos_name.trim().to_string()),
                    product_id: Set(request.product_id),
                    confidence: Set(request.confidence.unwrap_or(0.0)),
                    is_verified: Set(false),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?
            }
        };
        info!(mapping_id = %saved.id, "pos mapping saved");
        Ok(saved)
    }

    pub async fn verify(&self, id: Uuid, product_id: Option<Uuid>) -> Result<pos_mapping::Model, ServiceError> {
        let mapping = pos_mapping::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("PosMapping", id))?;
        if let Some(product_id) = product_id {
            self.ensure_product(product_id).await?;
        }

        let mut active = mapping.into_active_model();
        if product_id.is_some() {
            active.product_id = Set(product_id);
        }
        active.is_verified = Set(true);
        active.confidence = Set(1.0);
        let verified = active.update(&*self.db).await?;
        info!(mapping_id = %id, "pos mapping verified");
        Ok(verified)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = pos_mapping::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("PosMapping", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{seed_product, store_db};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn upsert_replaces_by_code_and_verify_pins_confidence() {
        let (_dir, db) = store_db().await;
        let milk = seed_product(&db, "Milk", 10, dec!(1), dec!(2)).await;
        let service = PosMappingService::new(db);

        let first = service
            .upsert(UpsertPosMappingRequest {
                pos_code: "1001".into(),
                pos_name: "MLK 1L".into(),
                product_id: None,
                confidence: Some(1.7),
            })
            .await
            .unwrap();
        assert_eq!(first.confidence, 1.0);
        assert!(!first.is_verified);

        let second = service
            .upsert(UpsertPosMappingRequest {
                pos_code: "1001".into(),
                pos_name: "MILK 1L".into(),
                product_id: Some(milk.id),
                confidence: Some(0.4),
            })
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(service.list().await.unwrap().len(), 1);

        let verified = service.verify(second.id, None).await.unwrap();
        assert!(verified.is_verified);
        assert_eq!(verified.confidence, 1.0);
        assert_eq!(verified.product_id, Some(milk.id));

        service.delete(second.id).await.unwrap();
        assert_matches!(service.delete(second.id).await, Err(ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_product_is_rejected() {
        let (_dir, db) = store_db().await;
        let service = PosMappingService::new(db);
        let result = service
            .upsert(UpsertPosMappingRequest {
                pos_code: "2002".into(),
                pos_name: "BREAD".into(),
                product_id: Some(Uuid::new_v4()),
                confidence: None,
            })
            .await;
        assert_matches!(result, Err(ServiceError::NotFound(_)));
    }
}
