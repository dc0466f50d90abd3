use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::tenant::{campaign, campaign_product, product};
use crate::errors::ServiceError;

pub const FLASH_SALE: &str = "flash_sale";
const DEFAULT_SALE_DAYS: u32 = 7;
const POST_PRODUCT_LIMIT: usize = 5;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CampaignRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub badge_label: Option<String>,
    pub badge_color: Option<String>,
    pub tagline: Option<String>,
    pub campaign_type: Option<String>,
    pub sort_order: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 200))]
    pub slug: Option<String>,
    pub is_active: Option<bool>,
    /// Replaces the linked products when present
    pub product_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CampaignProductsRequest {
    pub product_ids: Vec<Uuid>,
}

/// Where a pushed sale is announced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SaleChannel {
    Website,
    SocialMedia,
    Both,
}

impl SaleChannel {
    pub fn on_website(self) -> bool {
        matches!(self, Self::Website | Self::Both)
    }

    pub fn on_social(self) -> bool {
        matches!(self, Self::SocialMedia | Self::Both)
    }
}

/// Turns a selection of products (typically slow movers from the
/// analytics reports) into a flash sale
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PushToSaleRequest {
    #[validate(length(min = 1, message = "Pick at least one product"))]
    pub product_ids: Vec<Uuid>,
    #[validate(range(min = 1, max = 90))]
    pub discount_percent: u32,
    pub channel: SaleChannel,
    #[validate(range(min = 1, max = 90))]
    pub duration_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PushedSale {
    pub campaign: CampaignView,
    /// Drafted when the channel includes social media
    pub social_post: Option<SocialPost>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SegmentProduct {
    pub product_id: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CampaignView {
    #[serde(flatten)]
    pub campaign: campaign::Model,
    pub segment_products: Vec<SegmentProduct>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SocialPost {
    pub campaign_id: Uuid,
    pub text: String,
    pub hashtags: Vec<String>,
}

/// Lowercase, with every run of non-alphanumerics collapsed to one `-`
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn hashtag(text: &str) -> String {
    let tag: String = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect();
    format!("#{}", tag)
}

/// Builds the share text for a campaign and its featured products
pub fn compose_post(campaign: &campaign::Model, products: &[product::Model]) -> SocialPost {
    let mut lines = Vec::new();
    if campaign.campaign_type == FLASH_SALE {
        lines.push(format!("🔥 {} 🔥", campaign.title.to_uppercase()));
    } else {
        lines.push(format!("✨ {} ✨", campaign.title));
    }
    if let Some(subtitle) = campaign.subtitle.as_deref().filter(|s| !s.is_empty()) {
        lines.push(subtitle.to_string());
    }
    if let Some(tagline) = campaign.tagline.as_deref().filter(|s| !s.is_empty()) {
        lines.push(tagline.to_string());
    }
    if !products.is_empty() {
        lines.push(String::new());
        for p in products.iter().take(POST_PRODUCT_LIMIT) {
            lines.push(format!("• {} - ${:.2}", p.name, p.selling_price));
        }
    }

    let mut hashtags = vec![hashtag(&campaign.title)];
    if campaign.campaign_type == FLASH_SALE {
        hashtags.push("#FlashSale".to_string());
    }
    hashtags.push("#ShopLocal".to_string());
    lines.push(String::new());
    lines.push(hashtags.join(" "));

    SocialPost {
        campaign_id: campaign.id,
        text: lines.join("\n"),
        hashtags,
    }
}

/// Storefront promotions and the products they feature
pub struct CampaignService {
    db: Arc<DatabaseConnection>,
}

impl CampaignService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn ensure_slug_free(&self, slug: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = campaign::Entity::find().filter(campaign::Column::Slug.eq(slug));
        if let Some(id) = except {
            query = query.filter(campaign::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!("Campaign slug '{}' is taken", slug)));
        }
        Ok(())
    }

    async fn views(&self, campaigns: Vec<campaign::Model>) -> Result<Vec<CampaignView>, ServiceError> {
        let ids: Vec<Uuid> = campaigns.iter().map(|c| c.id).collect();
        let mut links: HashMap<Uuid, Vec<SegmentProduct>> = HashMap::new();
        for link in campaign_product::Entity::find()
            .filter(campaign_product::Column::CampaignId.is_in(ids))
            .all(&*self.db)
            .await?
        {
            links.entry(link.campaign_id).or_default().push(SegmentProduct {
                product_id: link.product_id,
            });
        }
        Ok(campaigns
            .into_iter()
            .map(|campaign| CampaignView {
                segment_products: links.remove(&campaign.id).unwrap_or_default(),
                campaign,
            })
            .collect())
    }

    async fn find(&self, id: Uuid) -> Result<campaign::Model, ServiceError> {
        campaign::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Campaign", id))
    }

    pub async fn list(&self) -> Result<Vec<CampaignView>, ServiceError> {
        let campaigns = campaign::Entity::find()
            .order_by_asc(campaign::Column::SortOrder)
            .order_by_asc(campaign::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        self.views(campaigns).await
    }

    /// Active campaigns whose date window contains `now`
    pub async fn active(&self, now: DateTime<Utc>) -> Result<Vec<CampaignView>, ServiceError> {
        let campaigns = campaign::Entity::find()
            .filter(campaign::Column::IsActive.eq(true))
            .order_by_asc(campaign::Column::SortOrder)
            .all(&*self.db)
            .await?
            .into_iter()
            .filter(|c| c.is_live_at(now))
            .collect();
        self.views(campaigns).await
    }

    pub async fn get(&self, id: Uuid) -> Result<CampaignView, ServiceError> {
        let campaign = self.find(id).await?;
        let mut views = self.views(vec![campaign]).await?;
        views.pop().ok_or_else(|| ServiceError::not_found("Campaign", id))
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CampaignRequest) -> Result<CampaignView, ServiceError> {
        request.validate()?;
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::ValidationError("title is required".into()))?
            .to_string();
        let slug = match request.slug.as_deref() {
            Some(slug) => slugify(slug),
            None => slugify(&title),
        };
        if slug.is_empty() {
            return Err(ServiceError::ValidationError(
                "title must contain letters or digits".into(),
            ));
        }
        self.ensure_slug_free(&slug, None).await?;

        let txn = self.db.begin().await?;
        let created = campaign::ActiveModel {
            title: Set(title),
            subtitle: Set(request.subtitle),
            badge_label: Set(request.badge_label),
            badge_color: Set(request.badge_color),
            tagline: Set(request.tagline),
            campaign_type: Set(request.campaign_type.unwrap_or_else(|| FLASH_SALE.to_string())),
            sort_order: Set(request.sort_order.unwrap_or(0)),
            start_date: Set(request.start_date),
            end_date: Set(request.end_date),
            slug: Set(slug),
            is_active: Set(request.is_active.unwrap_or(false)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        if let Some(ids) = request.product_ids {
            Self::link_products(&txn, created.id, &ids).await?;
        }
        txn.commit().await?;

        info!(campaign_id = %created.id, slug = %created.slug, "campaign created");
        self.get(created.id).await
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: Uuid, request: CampaignRequest) -> Result<CampaignView, ServiceError> {
        request.validate()?;
        let existing = self.find(id).await?;
        let slug = request.slug.as_deref().map(slugify);
        if let Some(slug) = slug.as_deref() {
            self.ensure_slug_free(slug, Some(id)).await?;
        }

        let txn = self.db.begin().await?;
        let mut active = existing.into_active_model();
        if let Some(title) = request.title {
            active.title = Set(title.trim().to_string());
        }
        if request.subtitle.is_some() {
            active.subtitle = Set(request.subtitle);
        }
        if request.badge_label.is_some() {
            active.badge_label = Set(request.badge_label);
        }
        if request.badge_color.is_some() {
            active.badge_color = Set(request.badge_color);
        }
        if request.tagline.is_some() {
            active.tagline = Set(request.tagline);
        }
        if let Some(kind) = request.campaign_type {
            active.campaign_type = Set(kind);
        }
        if let Some(order) = request.sort_order {
            active.sort_order = Set(order);
        }
        if request.start_date.is_some() {
            active.start_date = Set(request.start_date);
        }
        if request.end_date.is_some() {
            active.end_date = Set(request.end_date);
        }
        if let Some(slug) = slug {
            active.slug = Set(slug);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.update(&txn).await?;
        if let Some(ids) = request.product_ids {
            Self::link_products(&txn, id, &ids).await?;
        }
        txn.commit().await?;

        self.get(id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.find(id).await?;
        campaign::Entity::delete_by_id(id).exec(&*self.db).await?;
        info!(campaign_id = %id, "campaign deleted");
        Ok(())
    }

    /// Swaps the linked product set inside the caller's transaction
    async fn link_products(
        txn: &sea_orm::DatabaseTransaction,
        campaign_id: Uuid,
        product_ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        let unique: Vec<Uuid> = {
            let mut seen = HashSet::new();
            product_ids.iter().copied().filter(|id| seen.insert(*id)).collect()
        };
        let found = product::Entity::find()
            .filter(product::Column::Id.is_in(unique.clone()))
            .all(txn)
            .await?
            .len();
        if found != unique.len() {
            return Err(ServiceError::NotFound(
                "One or more campaign products do not exist".into(),
            ));
        }

        campaign_product::Entity::delete_many()
            .filter(campaign_product::Column::CampaignId.eq(campaign_id))
            .exec(txn)
            .await?;
        for product_id in unique {
            campaign_product::ActiveModel {
                id: Set(Uuid::new_v4()),
                campaign_id: Set(campaign_id),
                product_id: Set(product_id),
            }
            .insert(txn)
            .await?;
        }
        Ok(())
    }

    #[instrument(skip(self, product_ids), fields(count = product_ids.len()))]
    pub async fn set_products(&self, id: Uuid, product_ids: Vec<Uuid>) -> Result<CampaignView, ServiceError> {
        self.find(id).await?;
        let txn = self.db.begin().await?;
        Self::link_products(&txn, id, &product_ids).await?;
        txn.commit().await?;
        self.get(id).await
    }

    /// Creates a flash sale for the chosen products, starting now.
    /// Website sales go live immediately; social-only sales stay inactive
    /// on the storefront and come back with a drafted post.
    #[instrument(skip(self, request), fields(products = request.product_ids.len()))]
    pub async fn push_to_sale(&self, request: PushToSaleRequest) -> Result<PushedSale, ServiceError> {
        request.validate()?;
        let days = request.duration_days.unwrap_or(DEFAULT_SALE_DAYS);
        let now = Utc::now();
        let end = now + Duration::days(i64::from(days));
        let title = format!("{}% Off Flash Sale", request.discount_percent);
        let suffix = Uuid::new_v4().simple().to_string();
        let slug = format!("{}-{}", slugify(&title), &suffix[..6]);

        let txn = self.db.begin().await?;
        let created = campaign::ActiveModel {
            title: Set(title),
            subtitle: Set(Some(format!(
                "Save {}% on {} selected products",
                request.discount_percent,
                request.product_ids.len()
            ))),
            badge_label: Set(Some(format!("-{}%", request.discount_percent))),
            badge_color: Set(Some("red".to_string())),
            tagline: Set(Some(format!("Ends {}", end.format("%b %-d")))),
            campaign_type: Set(FLASH_SALE.to_string()),
            sort_order: Set(0),
            start_date: Set(Some(now)),
            end_date: Set(Some(end)),
            slug: Set(slug),
            is_active: Set(request.channel.on_website()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        Self::link_products(&txn, created.id, &request.product_ids).await?;
        txn.commit().await?;

        info!(
            campaign_id = %created.id,
            discount = request.discount_percent,
            channel = ?request.channel,
            "products pushed to sale"
        );
        let social_post = if request.channel.on_social() {
            Some(self.generate_post(created.id).await?)
        } else {
            None
        };
        Ok(PushedSale {
            campaign: self.get(created.id).await?,
            social_post,
        })
    }

    pub async fn generate_post(&self, id: Uuid) -> Result<SocialPost, ServiceError> {
        let view = self.get(id).await?;
        let ids: Vec<Uuid> = view.segment_products.iter().map(|s| s.product_id).collect();
        let products = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(compose_post(&view.campaign, &products))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{seed_product, store_db};
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case("Summer Sale!", "summer-sale")]
    #[test_case("  Back -- to   School ", "back-to-school")]
    #[test_case("50% OFF", "50-off")]
    #[test_case("!!!", "")]
    fn slugs_collapse_separators(title: &str, expected: &str) {
        assert_eq!(slugify(title), expected);
    }

    fn request(title: &str) -> CampaignRequest {
        CampaignRequest {
            title: Some(title.into()),
            subtitle: None,
            badge_label: None,
            badge_color: None,
            tagline: None,
            campaign_type: None,
            sort_order: None,
            start_date: None,
            end_date: None,
            slug: None,
            is_active: None,
            product_ids: None,
        }
    }

    #[tokio::test]
    async fn slugs_are_unique_and_lists_follow_sort_order() {
        let (_dir, db) = store_db().await;
        let service = CampaignService::new(db);
        let mut late = request("Weekend Deals");
        late.sort_order = Some(5);
        service.create(late).await.unwrap();
        let mut early = request("Summer Sale");
        early.sort_order = Some(1);
        let summer = service.create(early).await.unwrap();
        assert_eq!(summer.campaign.slug, "summer-sale");
        assert_eq!(summer.campaign.campaign_type, FLASH_SALE);
        assert!(!summer.campaign.is_active);

        assert_matches!(service.create(request("summer  sale")).await, Err(ServiceError::Conflict(_)));

        let titles: Vec<String> = service
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.campaign.title)
            .collect();
        assert_eq!(titles, vec!["Summer Sale", "Weekend Deals"]);
    }

    #[tokio::test]
    async fn active_respects_date_window() {
        let (_dir, db) = store_db().await;
        let service = CampaignService::new(db);
        let now = Utc::now();

        let mut open = request("Always On");
        open.is_active = Some(true);
        service.create(open).await.unwrap();

        let mut expired = request("Last Month");
        expired.is_active = Some(true);
        expired.end_date = Some(now - Duration::days(2));
        service.create(expired).await.unwrap();

        let mut upcoming = request("Next Week");
        upcoming.is_active = Some(true);
        upcoming.start_date = Some(now + Duration::days(7));
        service.create(upcoming).await.unwrap();

        service.create(request("Draft")).await.unwrap();

        let live = service.active(now).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].campaign.title, "Always On");
    }

    #[tokio::test]
    async fn products_are_replaced_and_used_in_posts() {
        let (_dir, db) = store_db().await;
        let cola = seed_product(&db, "Cola", 5, dec!(0.5), dec!(1.25)).await;
        let chips = seed_product(&db, "Chips", 5, dec!(0.8), dec!(2)).await;
        let service = CampaignService::new(db);
        let mut flash = request("Summer Sale");
        flash.subtitle = Some("Two days only".into());
        flash.product_ids = Some(vec![cola.id]);
        let campaign = service.create(flash).await.unwrap();
        assert_eq!(campaign.segment_products.len(), 1);

        let replaced = service
            .set_products(campaign.campaign.id, vec![chips.id, cola.id, chips.id])
            .await
            .unwrap();
        assert_eq!(replaced.segment_products.len(), 2);
        assert_matches!(
            service.set_products(campaign.campaign.id, vec![Uuid::new_v4()]).await,
            Err(ServiceError::NotFound(_))
        );

        let post = service.generate_post(campaign.campaign.id).await.unwrap();
        let lines: Vec<&str> = post.text.lines().collect();
        assert_eq!(lines[0], "🔥 SUMMER SALE 🔥");
        assert_eq!(lines[1], "Two days only");
        assert!(post.text.contains("• Chips - $2.00"));
        assert!(post.text.contains("• Cola - $1.25"));
        assert!(post.hashtags.contains(&"#SummerSale".to_string()));
    }

    #[test]
    fn seasonal_posts_use_sparkles_and_cap_products() {
        let now = Utc::now();
        let campaign = campaign::Model {
            id: Uuid::new_v4(),
            title: "Harvest Week".into(),
            subtitle: None,
            badge_label: None,
            badge_color: None,
            tagline: Some("Fresh from the farm".into()),
            campaign_type: "seasonal".into(),
            sort_order: 0,
            start_date: None,
            end_date: None,
            slug: "harvest-week".into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let products: Vec<product::Model> = (0..7)
            .map(|i| product::Model {
                id: Uuid::new_v4(),
                global_product_id: None,
                name: format!("Item {}", i),
                sku: None,
                barcode: None,
                category: "Produce".into(),
                description: None,
                cost_price: dec!(1),
                selling_price: dec!(2),
                stock: 1,
                reorder_level: 1,
                image_url: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let post = compose_post(&campaign, &products);
        assert!(post.text.starts_with("✨ Harvest Week ✨\nFresh from the farm"));
        assert_eq!(post.text.matches('•').count(), 5);
        assert!(!post.hashtags.contains(&"#FlashSale".to_string()));
    }

    fn push(ids: Vec<Uuid>, channel: SaleChannel) -> PushToSaleRequest {
        PushToSaleRequest {
            product_ids: ids,
            discount_percent: 25,
            channel,
            duration_days: Some(3),
        }
    }

    #[tokio::test]
    async fn pushing_to_sale_goes_live_on_the_website() {
        let (_dir, db) = store_db().await;
        let cola = seed_product(&db, "Cola", 40, dec!(0.5), dec!(1.25)).await;
        let service = CampaignService::new(db);

        let pushed = service
            .push_to_sale(push(vec![cola.id], SaleChannel::Website))
            .await
            .unwrap();
        let campaign = &pushed.campaign.campaign;
        assert_eq!(campaign.title, "25% Off Flash Sale");
        assert_eq!(campaign.campaign_type, FLASH_SALE);
        assert!(campaign.slug.starts_with("25-off-flash-sale-"));
        assert!(campaign.is_live_at(Utc::now()));
        assert!(!campaign.is_live_at(Utc::now() + Duration::days(4)));
        assert_eq!(pushed.campaign.segment_products.len(), 1);
        assert!(pushed.social_post.is_none());

        // a second push with the same discount gets its own slug
        service
            .push_to_sale(push(vec![cola.id], SaleChannel::Website))
            .await
            .unwrap();
        assert_eq!(service.active(Utc::now()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn social_pushes_draft_a_post() {
        let (_dir, db) = store_db().await;
        let cola = seed_product(&db, "Cola", 40, dec!(0.5), dec!(1.25)).await;
        let service = CampaignService::new(db);

        let social = service
            .push_to_sale(push(vec![cola.id], SaleChannel::SocialMedia))
            .await
            .unwrap();
        assert!(!social.campaign.campaign.is_active);
        let post = social.social_post.unwrap();
        assert!(post.text.contains("Cola"));
        assert!(post.hashtags.contains(&"#FlashSale".to_string()));

        let both = service
            .push_to_sale(push(vec![cola.id], SaleChannel::Both))
            .await
            .unwrap();
        assert!(both.campaign.campaign.is_active);
        assert!(both.social_post.is_some());
    }

    #[tokio::test]
    async fn push_to_sale_validates_its_input() {
        let (_dir, db) = store_db().await;
        let service = CampaignService::new(db);
        assert_matches!(
            service.push_to_sale(push(vec![], SaleChannel::Website)).await,
            Err(ServiceError::ValidationError(_))
        );
        let mut steep = push(vec![Uuid::new_v4()], SaleChannel::Website);
        steep.discount_percent = 95;
        assert_matches!(service.push_to_sale(steep).await, Err(ServiceError::ValidationError(_)));
        assert_matches!(
            service.push_to_sale(push(vec![Uuid::new_v4()], SaleChannel::Website)).await,
            Err(ServiceError::NotFound(_))
        );
        assert!(service.list().await.unwrap().is_empty());
    }
}
