use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::contains_ci;
use crate::entities::tenant::{customer, order, sale};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

pub struct CustomerService {
    db: Arc<DatabaseConnection>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn ensure_email_free(&self, email: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = customer::Entity::find().filter(customer::Column::Email.eq(email));
        if let Some(id) = except {
            query = query.filter(customer::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A customer with email {} already exists",
                email
            )));
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<customer::Model>, ServiceError> {
        Ok(customer::Entity::find()
            .order_by_asc(customer::Column::FullName)
            .all(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", id))
    }

    /// Matches name, email or phone
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<customer::Model>, ServiceError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(customer::Entity::find()
            .filter(
                Condition::any()
                    .add(contains_ci(customer::Column::FullName, query))
                    .add(contains_ci(customer::Column::Email, query))
                    .add(contains_ci(customer::Column::Phone, query)),
            )
            .order_by_asc(customer::Column::FullName)
            .limit(50)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateCustomerRequest) -> Result<customer::Model, ServiceError> {
        request.validate()?;
        let email = request.email.map(|e| e.trim().to_ascii_lowercase());
        if let Some(email) = email.as_deref() {
            self.ensure_email_free(email, None).await?;
        }

        let created = customer::ActiveModel {
            full_name: Set(request.full_name.trim().to_string()),
            email: Set(email),
            phone: Set(request.phone),
            address: Set(request.address),
            notes: Set(request.notes),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        info!(customer_id = %created.id, "customer created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: Uuid, request: UpdateCustomerRequest) -> Result<customer::Model, ServiceError> {
        request.validate()?;
        let mut active = self.get(id).await?.into_active_model();

        if let Some(name) = request.full_name {
            active.full_name = Set(name.trim().to_string());
        }
        if let Some(email) = request.email {
            let email = email.trim().to_ascii_lowercase();
            self.ensure_email_free(&email, Some(id)).await?;
            active.email = Set(Some(email));
        }
        if let Some(phone) = request.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(address) = request.address {
            active.address = Set(Some(address));
        }
        if let Some(notes) = request.notes {
            active.notes = Set(Some(notes));
        }
        Ok(active.update(&*self.db).await?)
    }

    /// Refuses customers that still have orders on file
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.get(id).await?;
        let orders = order::Entity::find()
            .filter(order::Column::CustomerId.eq(id))
            .count(&*self.db)
            .await?;
        if orders > 0 {
            return Err(ServiceError::Conflict(format!(
                "Customer has {} order(s) on file",
                orders
            )));
        }
        // sales keep their history without the customer link
        sale::Entity::update_many()
            .col_expr(sale::Column::CustomerId, sea_orm::sea_query::Expr::value(Option::<Uuid>::None))
            .filter(sale::Column::CustomerId.eq(id))
            .exec(&*self.db)
            .await?;
        customer::Entity::delete_by_id(id).exec(&*self.db).await?;
        info!(customer_id = %id, "customer deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::store_db;
    use assert_matches::assert_matches;
    use fake::faker::name::en::Name;
    use fake::Fake;

    fn request(name: &str, email: Option<&str>, phone: Option<&str>) -> CreateCustomerRequest {
        CreateCustomerRequest {
            full_name: name.into(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            address: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn search_covers_name_email_and_phone() {
        let (_dir, db) = store_db().await;
        let service = CustomerService::new(db);
        service
            .create(request("Grace Hopper", Some("grace@navy.test"), Some("555-0101")))
            .await
            .unwrap();
        service
            .create(request("Alan Turing", Some("alan@bletchley.test"), Some("555-0202")))
            .await
            .unwrap();
        let random: String = Name().fake();
        service.create(request(&random, None, None)).await.unwrap();

        assert_eq!(service.search("hopper").await.unwrap().len(), 1);
        assert_eq!(service.search("BLETCHLEY").await.unwrap()[0].full_name, "Alan Turing");
        assert_eq!(service.search("555-0").await.unwrap().len(), 2);
        assert!(service.search(" ").await.unwrap().is_empty());
        assert_eq!(service.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn emails_are_unique_and_updates_apply() {
        let (_dir, db) = store_db().await;
        let service = CustomerService::new(db);
        let grace = service
            .create(request("Grace Hopper", Some("Grace@Navy.test"), None))
            .await
            .unwrap();
        assert_eq!(grace.email.as_deref(), Some("grace@navy.test"));
        assert_matches!(
            service.create(request("Impostor", Some("grace@navy.test"), None)).await,
            Err(ServiceError::Conflict(_))
        );

        let updated = service
            .update(
                grace.id,
                UpdateCustomerRequest {
                    phone: Some("555-9999".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone.as_deref(), Some("555-9999"));
        assert_eq!(updated.full_name, "Grace Hopper");

        service.delete(grace.id).await.unwrap();
        assert_matches!(service.get(grace.id).await, Err(ServiceError::NotFound(_)));
    }
}
