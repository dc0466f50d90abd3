use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Marketing promotion shown on the storefront
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "campaigns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    pub subtitle: Option<String>,
    pub badge_label: Option<String>,
    pub badge_color: Option<String>,
    pub tagline: Option<String>,
    pub campaign_type: String,
    pub sort_order: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[sea_orm(unique)]
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Active and inside its date window; open bounds always match.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.start_date.map_or(true, |start| start <= now)
            && self.end_date.map_or(true, |end| end >= now)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::campaign_product::Entity")]
    CampaignProducts,
}

impl Related<super::campaign_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CampaignProducts.def()
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
            model.created_at = Set(now);
        }
        model.updated_at = Set(now);
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn campaign(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>, active: bool) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            title: "Weekend".into(),
            subtitle: None,
            badge_label: None,
            badge_color: None,
            tagline: None,
            campaign_type: "flash_sale".into(),
            sort_order: 0,
            start_date: start,
            end_date: end,
            slug: "weekend".into(),
            is_active: active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn open_bounds_are_live() {
        assert!(campaign(None, None, true).is_live_at(Utc::now()));
    }

    #[test]
    fn inactive_or_expired_is_not_live() {
        let now = Utc::now();
        assert!(!campaign(None, None, false).is_live_at(now));
        assert!(!campaign(None, Some(now - Duration::days(1)), true).is_live_at(now));
        assert!(!campaign(Some(now + Duration::days(1)), None, true).is_live_at(now));
    }
}
