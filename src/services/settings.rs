use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set, TryIntoModel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::entities::tenant::{payment_config, store_settings};
use crate::errors::ServiceError;

pub const DEFAULT_TAX_RATE: Decimal = dec!(0.08);
pub const DEFAULT_CURRENCY: &str = "USD";

fn unit_rate(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() || *value > Decimal::ONE {
        return Err(ValidationError::new("tax_rate_out_of_range"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoreSettingsView {
    pub store_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub currency: String,
    pub tax_rate: Decimal,
    pub receipt_footer: Option<String>,
}

impl Default for StoreSettingsView {
    fn default() -> Self {
        Self {
            store_name: "My Store".to_string(),
            address: None,
            phone: None,
            email: None,
            currency: DEFAULT_CURRENCY.to_string(),
            tax_rate: DEFAULT_TAX_RATE,
            receipt_footer: None,
        }
    }
}

impl From<store_settings::Model> for StoreSettingsView {
    fn from(m: store_settings::Model) -> Self {
        Self {
            store_name: m.store_name,
            address: m.address,
            phone: m.phone,
            email: m.email,
            currency: m.currency,
            tax_rate: m.tax_rate,
            receipt_footer: m.receipt_footer,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateStoreSettingsRequest {
    #[validate(length(min = 1, max = 200))]
    pub store_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate(custom = "unit_rate")]
    pub tax_rate: Option<Decimal>,
    pub receipt_footer: Option<String>,
}

/// Payment settings as shown to the admin UI. The secret key never leaves the server.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentSettingsView {
    pub stripe_publishable_key: String,
    pub has_secret_key: bool,
    pub payment_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdatePaymentSettingsRequest {
    #[validate(length(min = 1))]
    pub stripe_publishable_key: String,
    /// Omit to keep the stored secret
    pub stripe_secret_key: Option<String>,
}

pub struct SettingsService {
    db: Arc<DatabaseConnection>,
}

impl SettingsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn store(&self) -> Result<StoreSettingsView, ServiceError> {
        Ok(store_settings::Entity::find()
            .one(&*self.db)
            .await?
            .map(StoreSettingsView::from)
            .unwrap_or_default())
    }

    #[instrument(skip(self, request))]
    pub async fn update_store(&self, request: UpdateStoreSettingsRequest) -> Result<StoreSettingsView, ServiceError> {
        request.validate()?;
        let mut active = match store_settings::Entity::find().one(&*self.db).await? {
            Some(existing) => existing.into_active_model(),
            None => {
                let defaults = StoreSettingsView::default();
                store_settings::ActiveModel {
                    store_name: Set(defaults.store_name),
                    currency: Set(defaults.currency),
                    tax_rate: Set(defaults.tax_rate),
                    ..Default::default()
                }
            }
        };

        if let Some(name) = request.store_name {
            active.store_name = Set(name.trim().to_string());
        }
        if request.address.is_some() {
            active.address = Set(request.address);
        }
        if request.phone.is_some() {
            active.phone = Set(request.phone);
        }
        if request.email.is_some() {
            active.email = Set(request.email);
        }
        if let Some(currency) = request.currency {
            active.currency = Set(currency.to_ascii_uppercase());
        }
        if let Some(rate) = request.tax_rate {
            active.tax_rate = Set(rate);
        }
        if request.receipt_footer.is_some() {
            active.receipt_footer = Set(request.receipt_footer);
        }

        let saved = active.save(&*self.db).await?;
        let model: store_settings::Model = saved.try_into_model()?;
        info!("store settings saved");
        Ok(model.into())
    }

    pub async fn payment(&self) -> Result<PaymentSettingsView, ServiceError> {
        Ok(match payment_config::Entity::find().one(&*self.db).await? {
            Some(config) => PaymentSettingsView {
                has_secret_key: !config.stripe_secret_key.is_empty(),
                payment_enabled: config.is_active && !config.stripe_secret_key.is_empty(),
                stripe_publishable_key: config.stripe_publishable_key,
            },
            None => PaymentSettingsView {
                stripe_publishable_key: String::new(),
                has_secret_key: false,
                payment_enabled: false,
            },
        })
    }

    #[instrument(skip(self, request))]
    pub async fn update_payment(&self, request: UpdatePaymentSettingsRequest) -> Result<PaymentSettingsView, ServiceError> {
        request.validate()?;
        let secret = request
            .stripe_secret_key
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match payment_config::Entity::find().one(&*self.db).await? {
            Some(existing) => {
                let mut active = existing.into_active_model();
                active.stripe_publishable_key = Set(request.stripe_publishable_key.trim().to_string());
                if let Some(secret) = secret {
                    active.stripe_secret_key = Set(secret);
                }
                active.is_active = Set(true);
                active.update(&*self.db).await?;
            }
            None => {
                payment_config::ActiveModel {
                    stripe_publishable_key: Set(request.stripe_publishable_key.trim().to_string()),
                    stripe_secret_key: Set(secret.unwrap_or_default()),
                    is_active: Set(true),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;
            }
        }
        info!("payment settings saved");
        self.payment().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::store_db;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn store_settings_default_then_upsert() {
        let (_dir, db) = store_db().await;
        let service = SettingsService::new(db);
        let defaults = service.store().await.unwrap();
        assert_eq!(defaults.currency, "USD");
        assert_eq!(defaults.tax_rate, dec!(0.08));

        let saved = service
            .update_store(UpdateStoreSettingsRequest {
                store_name: Some("Corner Shop".into()),
                tax_rate: Some(dec!(0.05)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(saved.store_name, "Corner Shop");

        let again = service
            .update_store(UpdateStoreSettingsRequest {
                currency: Some("eur".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(again.store_name, "Corner Shop");
        assert_eq!(again.currency, "EUR");
        assert_eq!(again.tax_rate.round_dp(2), dec!(0.05));

        assert_matches!(
            service
                .update_store(UpdateStoreSettingsRequest {
                    tax_rate: Some(dec!(1.5)),
                    ..Default::default()
                })
                .await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn payment_settings_hide_the_secret() {
        let (_dir, db) = store_db().await;
        let service = SettingsService::new(db);
        let empty = service.payment().await.unwrap();
        assert_eq!(empty.stripe_publishable_key, "");
        assert!(!empty.has_secret_key);
        assert!(!empty.payment_enabled);

        let saved = service
            .update_payment(UpdatePaymentSettingsRequest {
                stripe_publishable_key: "pk_test_1".into(),
                stripe_secret_key: Some("sk_test_1".into()),
            })
            .await
            .unwrap();
        assert!(saved.has_secret_key);
        assert!(saved.payment_enabled);

        let rotated = service
            .update_payment(UpdatePaymentSettingsRequest {
                stripe_publishable_key: "pk_test_2".into(),
                stripe_secret_key: None,
            })
            .await
            .unwrap();
        assert_eq!(rotated.stripe_publishable_key, "pk_test_2");
        assert!(rotated.has_secret_key);

        let json = serde_json::to_string(&rotated).unwrap();
        assert!(!json.contains("sk_test_1"));
    }
}
