use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::{contains_ci, equals_ci};
use crate::entities::tenant::{invoice, purchase_order, vendor};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct VendorRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub ein: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub contact_phone: Option<String>,
    pub fax: Option<String>,
    pub poc_name: Option<String>,
}

pub struct VendorService {
    db: Arc<DatabaseConnection>,
}

impl VendorService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn ensure_name_free(&self, name: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = vendor::Entity::find().filter(equals_ci(vendor::Column::Name, name));
        if let Some(id) = except {
            query = query.filter(vendor::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!("Vendor {} already exists", name.trim())));
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<vendor::Model>, ServiceError> {
        Ok(vendor::Entity::find()
            .order_by_asc(vendor::Column::Name)
            .all(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<vendor::Model, ServiceError> {
        vendor::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Vendor", id))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<vendor::Model>, ServiceError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vendor::Entity::find()
            .filter(
                Condition::any()
                    .add(contains_ci(vendor::Column::Name, query))
                    .add(contains_ci(vendor::Column::Email, query)),
            )
            .order_by_asc(vendor::Column::Name)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: VendorRequest) -> Result<vendor::Model, ServiceError> {
        request.validate()?;
        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ServiceError::ValidationError("name is required".into()))?
            .to_string();
        self.ensure_name_free(&name, None).await?;

        let created = vendor::ActiveModel {
            name: Set(name),
            ein: Set(request.ein),
            address: Set(request.address),
            website: Set(request.website),
            email: Set(request.email),
            contact_phone: Set(request.contact_phone),
            fax: Set(request.fax),
            poc_name: Set(request.poc_name),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        info!(vendor_id = %created.id, "vendor created");
        Ok(created)
    }

    /// Only fields present in the request change
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: Uuid, request: VendorRequest) -> Result<vendor::Model, ServiceError> {
        request.validate()?;
        let mut active = self.get(id).await?.into_active_model();

        if let Some(name) = request.name.as_deref().map(str::trim) {
            self.ensure_name_free(name, Some(id)).await?;
            active.name = Set(name.to_string());
        }
        if request.ein.is_some() {
            active.ein = Set(request.ein);
        }
        if request.address.is_some() {
            active.address = Set(request.address);
        }
        if request.website.is_some() {
            active.website = Set(request.website);
        }
        if request.email.is_some() {
            active.email = Set(request.email);
        }
        if request.contact_phone.is_some() {
            active.contact_phone = Set(request.contact_phone);
        }
        if request.fax.is_some() {
            active.fax = Set(request.fax);
        }
        if request.poc_name.is_some() {
            active.poc_name = Set(request.poc_name);
        }
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.get(id).await?;
        let purchase_orders = purchase_order::Entity::find()
            .filter(purchase_order::Column::VendorId.eq(id))
            .count(&*self.db)
            .await?;
        let invoices = invoice::Entity::find()
            .filter(invoice::Column::VendorId.eq(id))
            .count(&*self.db)
            .await?;
        if purchase_orders + invoices > 0 {
            return Err(ServiceError::Conflict(
                "Vendor is referenced by invoices or purchase orders".into(),
            ));
        }
        vendor::Entity::delete_by_id(id).exec(&*self.db).await?;
        info!(vendor_id = %id, "vendor deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::purchase_orders::{PurchaseOrderLine, PurchaseOrderService};
    use crate::services::testing::{seed_product, store_db};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn named(name: &str, email: Option<&str>) -> VendorRequest {
        VendorRequest {
            name: Some(name.into()),
            email: email.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn crud_and_search() {
        let (_dir, db) = store_db().await;
        let service = VendorService::new(db);
        let sysco = service.create(named("Sysco", Some("orders@sysco.test"))).await.unwrap();
        service.create(named("McLane", None)).await.unwrap();

        assert_matches!(service.create(named("sysco", None)).await, Err(ServiceError::Conflict(_)));
        assert_matches!(
            service.create(VendorRequest::default()).await,
            Err(ServiceError::ValidationError(_))
        );

        assert_eq!(service.search("SYSCO.TEST").await.unwrap().len(), 1);
        let updated = service
            .update(sysco.id, VendorRequest { fax: Some("555-0110".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.fax.as_deref(), Some("555-0110"));
        assert_eq!(updated.email.as_deref(), Some("orders@sysco.test"));
        assert_eq!(service.list().await.unwrap()[0].name, "McLane");
    }

    #[tokio::test]
    async fn referenced_vendor_cannot_be_deleted() {
        let (_dir, db) = store_db().await;
        let service = VendorService::new(db.clone());
        let vendor = service.create(named("Acme", None)).await.unwrap();
        let product = seed_product(&db, "Flour", 1, dec!(2), dec!(3)).await;
        PurchaseOrderService::new(db.clone())
            .create_draft(
                vendor.id,
                vec![PurchaseOrderLine { product_id: product.id, quantity: 5, unit_cost: None }],
                None,
            )
            .await
            .unwrap();

        assert_matches!(service.delete(vendor.id).await, Err(ServiceError::Conflict(_)));
        let spare = service.create(named("Spare", None)).await.unwrap();
        service.delete(spare.id).await.unwrap();
    }
}
