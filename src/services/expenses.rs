use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::tenant::expense;
use crate::errors::ServiceError;

fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("amount_must_be_positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateExpenseRequest {
    pub expense_date: NaiveDate,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[validate(custom = "positive_amount")]
    pub amount: Decimal,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateExpenseRequest {
    pub expense_date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[validate(custom = "positive_amount")]
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ExpenseFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
}

pub struct ExpenseService {
    db: Arc<DatabaseConnection>,
}

impl ExpenseService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Newest expense date first
    pub async fn list(&self, filter: ExpenseFilter) -> Result<Vec<expense::Model>, ServiceError> {
        let mut condition = Condition::all();
        if let Some(start) = filter.start_date {
            condition = condition.add(expense::Column::ExpenseDate.gte(start));
        }
        if let Some(end) = filter.end_date {
            condition = condition.add(expense::Column::ExpenseDate.lte(end));
        }
        if let Some(category) = filter.category.as_deref().filter(|c| !c.trim().is_empty()) {
            condition = condition.add(expense::Column::Category.eq(category.trim()));
        }
        Ok(expense::Entity::find()
            .filter(condition)
            .order_by_desc(expense::Column::ExpenseDate)
            .order_by_desc(expense::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<expense::Model, ServiceError> {
        expense::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Expense", id))
    }

    /// Distinct categories in alphabetical order
    pub async fn categories(&self) -> Result<Vec<String>, ServiceError> {
        Ok(expense::Entity::find()
            .select_only()
            .column(expense::Column::Category)
            .distinct()
            .order_by_asc(expense::Column::Category)
            .into_tuple::<String>()
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, request), fields(category = %request.category))]
    pub async fn create(&self, request: CreateExpenseRequest) -> Result<expense::Model, ServiceError> {
        request.validate()?;
        let created = expense::ActiveModel {
            expense_date: Set(request.expense_date),
            category: Set(request.category.trim().to_string()),
            amount: Set(request.amount),
            description: Set(request.description),
            payment_method: Set(request.payment_method),
            receipt_url: Set(request.receipt_url),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        info!(expense_id = %created.id, amount = %created.amount, "expense recorded");
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, request: UpdateExpenseRequest) -> Result<expense::Model, ServiceError> {
        request.validate()?;
        let mut active = self.get(id).await?.into_active_model();
        if let Some(date) = request.expense_date {
            active.expense_date = Set(date);
        }
        if let Some(category) = request.category {
            active.category = Set(category.trim().to_string());
        }
        if let Some(amount) = request.amount {
            active.amount = Set(amount);
        }
        if request.description.is_some() {
            active.description = Set(request.description);
        }
        if request.payment_method.is_some() {
            active.payment_method = Set(request.payment_method);
        }
        if request.receipt_url.is_some() {
            active.receipt_url = Set(request.receipt_url);
        }
        Ok(active.update(&*self.db).await?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.get(id).await?;
        expense::Entity::delete_by_id(id).exec(&*self.db).await?;
        info!(expense_id = %id, "expense deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::store_db;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn expense(day: u32, category: &str, amount: Decimal) -> CreateExpenseRequest {
        CreateExpenseRequest {
            expense_date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            category: category.into(),
            amount,
            description: None,
            payment_method: Some("card".into()),
            receipt_url: None,
        }
    }

    #[tokio::test]
    async fn amounts_must_be_positive() {
        let (_dir, db) = store_db().await;
        let service = ExpenseService::new(db);
        assert_matches!(
            service.create(expense(1, "Rent", dec!(0))).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            service.create(expense(1, "Rent", dec!(-5))).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn filters_and_categories() {
        let (_dir, db) = store_db().await;
        let service = ExpenseService::new(db);
        service.create(expense(1, "Utilities", dec!(120))).await.unwrap();
        service.create(expense(10, "Rent", dec!(1500))).await.unwrap();
        service.create(expense(20, "Utilities", dec!(80))).await.unwrap();

        let june_first_half = service
            .list(ExpenseFilter {
                start_date: NaiveDate::from_ymd_opt(2024, 6, 1),
                end_date: NaiveDate::from_ymd_opt(2024, 6, 15),
                category: None,
            })
            .await
            .unwrap();
        assert_eq!(june_first_half.len(), 2);
        assert_eq!(june_first_half[0].category, "Rent");

        let utilities = service
            .list(ExpenseFilter {
                category: Some("Utilities".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(utilities.len(), 2);

        assert_eq!(service.categories().await.unwrap(), vec!["Rent", "Utilities"]);
    }
}
