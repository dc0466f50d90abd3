use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{hash_password, verify_password};
use crate::entities::tenant::customer;
use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    pub phone: Option<String>,
    /// `customer` (default), `staff` or `admin`. Staff roles need an admin token.
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Account lookup and credential checks against one user table
pub struct UserService {
    db: Arc<DatabaseConnection>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email.trim().to_ascii_lowercase()))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    /// Checks credentials. Unknown emails and wrong passwords look the same.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<user::Model, ServiceError> {
        let user = match self.find_by_email(email).await? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                warn!("failed login attempt");
                return Err(ServiceError::Unauthorized("Invalid email or password".into()));
            }
        };
        if !user.is_active {
            return Err(ServiceError::Forbidden("Account is disabled".into()));
        }
        Ok(user)
    }

    /// Creates a store account. Customers also get a `customers` record.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(
        &self,
        request: RegisterRequest,
        role: UserRole,
    ) -> Result<user::Model, ServiceError> {
        request.validate()?;
        if role == UserRole::Superadmin {
            return Err(ServiceError::Forbidden(
                "Platform operators cannot self-register".into(),
            ));
        }

        let email = request.email.trim().to_ascii_lowercase();
        if self.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict("Email already registered".into()));
        }
        let password_hash = hash_password(&request.password)?;

        let txn = self.db.begin().await?;
        let created = user::ActiveModel {
            email: Set(email.clone()),
            full_name: Set(request.full_name.trim().to_string()),
            password_hash: Set(password_hash),
            role: Set(role),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        if role == UserRole::Customer {
            let has_record = customer::Entity::find()
                .filter(customer::Column::Email.eq(email.as_str()))
                .one(&txn)
                .await?
                .is_some();
            if !has_record {
                customer::ActiveModel {
                    full_name: Set(created.full_name.clone()),
                    email: Set(Some(email)),
                    phone: Set(request.phone.clone()),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
            }
        }
        txn.commit().await?;

        info!(user_id = %created.id, role = role.as_str(), "account registered");
        Ok(created)
    }

    /// Creates the platform operator from configuration when missing
    #[instrument(skip(self, password))]
    pub async fn ensure_superadmin(&self, email: &str, password: &str) -> Result<bool, ServiceError> {
        if self.find_by_email(email).await?.is_some() {
            return Ok(false);
        }
        user::ActiveModel {
            email: Set(email.trim().to_ascii_lowercase()),
            full_name: Set("Platform Administrator".to_string()),
            password_hash: Set(hash_password(password)?),
            role: Set(UserRole::Superadmin),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        info!("bootstrap platform operator created");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{master_db, store_db};
    use assert_matches::assert_matches;

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: "correct-horse".into(),
            full_name: "Ada Shopper".into(),
            phone: Some("555-0100".into()),
            role: None,
        }
    }

    #[tokio::test]
    async fn customer_registration_creates_customer_record() {
        let (_dir, db) = store_db().await;
        let service = UserService::new(db.clone());
        let user = service
            .register(register_request("Ada@Shop.test"), UserRole::Customer)
            .await
            .unwrap();
        assert_eq!(user.email, "ada@shop.test");

        let record = customer::Entity::find().one(&*db).await.unwrap().unwrap();
        assert_eq!(record.email.as_deref(), Some("ada@shop.test"));

        assert_matches!(
            service
                .register(register_request("ada@shop.test"), UserRole::Customer)
                .await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn authenticate_checks_password_and_status() {
        let (_dir, db) = store_db().await;
        let service = UserService::new(db.clone());
        let user = service
            .register(register_request("clerk@shop.test"), UserRole::Staff)
            .await
            .unwrap();

        assert!(service.authenticate("clerk@shop.test", "correct-horse").await.is_ok());
        assert_matches!(
            service.authenticate("clerk@shop.test", "wrong-horse").await,
            Err(ServiceError::Unauthorized(_))
        );
        assert_matches!(
            service.authenticate("nobody@shop.test", "correct-horse").await,
            Err(ServiceError::Unauthorized(_))
        );

        let mut active: user::ActiveModel = user.into();
        active.is_active = Set(false);
        active.update(&*db).await.unwrap();
        assert_matches!(
            service.authenticate("clerk@shop.test", "correct-horse").await,
            Err(ServiceError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn superadmin_bootstrap_is_idempotent() {
        let (_dir, db) = master_db().await;
        let service = UserService::new(db);
        assert!(service.ensure_superadmin("ops@retailos.test", "operator-pass").await.unwrap());
        assert!(!service.ensure_superadmin("ops@retailos.test", "operator-pass").await.unwrap());
        let op = service.authenticate("ops@retailos.test", "operator-pass").await.unwrap();
        assert_eq!(op.role, UserRole::Superadmin);
    }
}
