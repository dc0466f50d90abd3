//! Shelf audits: count what is physically on the shelf, compare it with the
//! recorded stock and book the difference as an AUDIT movement.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::tenant::{
    product,
    shelf_audit::{self, AuditStatus},
    shelf_audit_item,
    stock_movement::{self, MovementType},
};
use crate::errors::ServiceError;
use crate::services::products::{decrement_stock, increment_stock};

const DEFAULT_HISTORY_LIMIT: u64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AuditCount {
    pub product_id: Uuid,
    #[validate(range(min = 0))]
    pub actual_quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CompleteAuditRequest {
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "an audit needs at least one count"))]
    pub items: Vec<AuditCount>,
    /// Book the differences straight away (default). When false the audit
    /// waits for an explicit apply or reject.
    pub auto_adjust: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditStarted {
    #[serde(flatten)]
    pub audit: shelf_audit::Model,
    /// Active products the counter should expect to find
    pub expected_items_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AuditSummary {
    pub audit_id: Uuid,
    pub status: AuditStatus,
    pub total_items: usize,
    pub items_adjusted: usize,
    /// Sum of absolute differences
    pub total_discrepancy: u64,
    pub auto_adjusted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LineOutcome {
    Loss,
    Gain,
    Match,
}

impl LineOutcome {
    pub fn of(discrepancy: i64) -> Self {
        match discrepancy {
            d if d < 0 => Self::Loss,
            d if d > 0 => Self::Gain,
            _ => Self::Match,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditLine {
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub expected: i32,
    pub actual: i32,
    pub discrepancy: i64,
    pub outcome: LineOutcome,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditDetail {
    #[serde(flatten)]
    pub audit: shelf_audit::Model,
    pub total_items: usize,
    pub total_loss: u64,
    pub total_gain: u64,
    pub items: Vec<AuditLine>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditHistoryEntry {
    #[serde(flatten)]
    pub audit: shelf_audit::Model,
    pub items_count: u64,
}

fn wrong_state(audit: &shelf_audit::Model, action: &str) -> ServiceError {
    ServiceError::Conflict(format!(
        "Audit {} is {:?} and cannot be {}",
        audit.id, audit.status, action
    ))
}

/// Shelf counts and stock reconciliation for one store
pub struct AuditService {
    db: Arc<DatabaseConnection>,
}

impl AuditService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<shelf_audit::Model, ServiceError> {
        shelf_audit::Entity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Audit", id))
    }

    #[instrument(skip(self))]
    pub async fn start(&self, audited_by: Option<Uuid>) -> Result<AuditStarted, ServiceError> {
        let audit = shelf_audit::ActiveModel {
            audited_by: Set(audited_by),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        let expected_items_count = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .count(&*self.db)
            .await?;

        info!(audit_id = %audit.id, expected_items_count, "shelf audit started");
        Ok(AuditStarted {
            audit,
            expected_items_count,
        })
    }

    /// Records the counted quantities against current stock. Differences are
    /// booked immediately unless `auto_adjust` is false.
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn complete(&self, id: Uuid, request: CompleteAuditRequest) -> Result<AuditSummary, ServiceError> {
        request.validate()?;
        for count in &request.items {
            count.validate()?;
        }
        let mut seen = HashSet::new();
        if let Some(dup) = request.items.iter().find(|c| !seen.insert(c.product_id)) {
            return Err(ServiceError::ValidationError(format!(
                "Product {} is counted twice",
                dup.product_id
            )));
        }

        let txn = self.db.begin().await?;
        let audit = Self::find(&txn, id).await?;
        if audit.status != AuditStatus::InProgress {
            return Err(wrong_state(&audit, "completed"));
        }

        let mut lines = Vec::with_capacity(request.items.len());
        for count in &request.items {
            let product = product::Entity::find_by_id(count.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Product", count.product_id))?;
            let line = shelf_audit_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                audit_id: Set(id),
                product_id: Set(product.id),
                expected_quantity: Set(product.stock),
                actual_quantity: Set(count.actual_quantity),
                discrepancy: Set(i64::from(count.actual_quantity) - i64::from(product.stock)),
            }
            .insert(&txn)
            .await?;
            lines.push(line);
        }

        let auto_adjust = request.auto_adjust.unwrap_or(true);
        let items_adjusted = if auto_adjust {
            Self::book_differences(&txn, id, &lines).await?
        } else {
            0
        };

        let mut active = audit.into_active_model();
        if let Some(notes) = request.notes.filter(|n| !n.trim().is_empty()) {
            active.notes = Set(Some(notes));
        }
        active.completed_at = Set(Some(Utc::now()));
        active.status = Set(if auto_adjust {
            AuditStatus::Applied
        } else {
            AuditStatus::Pending
        });
        let audit = active.update(&txn).await?;
        txn.commit().await?;

        let summary = summarize(&audit, &lines, items_adjusted, auto_adjust);
        info!(
            audit_id = %id,
            adjusted = summary.items_adjusted,
            discrepancy = summary.total_discrepancy,
            "shelf audit completed"
        );
        Ok(summary)
    }

    /// Books a pending audit's differences into stock
    #[instrument(skip(self))]
    pub async fn apply(&self, id: Uuid) -> Result<AuditSummary, ServiceError> {
        let txn = self.db.begin().await?;
        let audit = Self::find(&txn, id).await?;
        if audit.status != AuditStatus::Pending {
            return Err(wrong_state(&audit, "applied"));
        }
        let lines = shelf_audit_item::Entity::find()
            .filter(shelf_audit_item::Column::AuditId.eq(id))
            .all(&txn)
            .await?;
        let items_adjusted = Self::book_differences(&txn, id, &lines).await?;

        let mut active = audit.into_active_model();
        active.status = Set(AuditStatus::Applied);
        let audit = active.update(&txn).await?;
        txn.commit().await?;

        info!(audit_id = %id, items_adjusted, "shelf audit applied");
        Ok(summarize(&audit, &lines, items_adjusted, true))
    }

    /// Closes a pending audit without touching stock
    #[instrument(skip(self))]
    pub async fn reject(&self, id: Uuid) -> Result<shelf_audit::Model, ServiceError> {
        let audit = Self::find(&*self.db, id).await?;
        if audit.status != AuditStatus::Pending {
            return Err(wrong_state(&audit, "rejected"));
        }
        let mut active = audit.into_active_model();
        active.status = Set(AuditStatus::Rejected);
        let rejected = active.update(&*self.db).await?;
        info!(audit_id = %id, "shelf audit rejected");
        Ok(rejected)
    }

    /// Moves each counted product by its difference. The delta is applied
    /// rather than the counted figure so that sales recorded after the count
    /// are kept. A loss larger than the remaining stock empties the shelf.
    async fn book_differences<C: ConnectionTrait>(
        conn: &C,
        audit_id: Uuid,
        lines: &[shelf_audit_item::Model],
    ) -> Result<usize, ServiceError> {
        let reason = format!("Shelf audit {}", &audit_id.simple().to_string()[..8]);
        let mut adjusted = 0;
        for line in lines.iter().filter(|l| l.discrepancy != 0) {
            let delta = i32::try_from(line.discrepancy).map_err(|_| {
                ServiceError::ValidationError(format!(
                    "Difference for product {} is out of range",
                    line.product_id
                ))
            })?;
            // counts are never negative, so a loss is at least -i32::MAX
            if delta > 0 {
                increment_stock(conn, line.product_id, delta).await?;
            } else if !decrement_stock(conn, line.product_id, -delta).await? {
                warn!(product_id = %line.product_id, "audit loss exceeds stock on hand");
                product::Entity::update_many()
                    .col_expr(product::Column::Stock, Expr::value(0))
                    .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product::Column::Id.eq(line.product_id))
                    .exec(conn)
                    .await?;
            }
            stock_movement::record(line.product_id, MovementType::Audit, delta, reason.as_str())
                .insert(conn)
                .await?;
            adjusted += 1;
        }
        Ok(adjusted)
    }

    pub async fn history(&self, limit: Option<u64>) -> Result<Vec<AuditHistoryEntry>, ServiceError> {
        let audits = shelf_audit::Entity::find()
            .order_by_desc(shelf_audit::Column::StartedAt)
            .limit(limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .all(&*self.db)
            .await?;

        let mut entries = Vec::with_capacity(audits.len());
        for audit in audits {
            let items_count = shelf_audit_item::Entity::find()
                .filter(shelf_audit_item::Column::AuditId.eq(audit.id))
                .count(&*self.db)
                .await?;
            entries.push(AuditHistoryEntry { audit, items_count });
        }
        Ok(entries)
    }

    pub async fn details(&self, id: Uuid) -> Result<AuditDetail, ServiceError> {
        let audit = Self::find(&*self.db, id).await?;
        let items = shelf_audit_item::Entity::find()
            .filter(shelf_audit_item::Column::AuditId.eq(id))
            .all(&*self.db)
            .await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let names: HashMap<Uuid, String> = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut total_loss = 0u64;
        let mut total_gain = 0u64;
        let lines: Vec<AuditLine> = items
            .into_iter()
            .map(|item| {
                match LineOutcome::of(item.discrepancy) {
                    LineOutcome::Loss => total_loss += item.discrepancy.unsigned_abs(),
                    LineOutcome::Gain => total_gain += item.discrepancy.unsigned_abs(),
                    LineOutcome::Match => {}
                }
                AuditLine {
                    product_id: item.product_id,
                    product_name: names.get(&item.product_id).cloned(),
                    expected: item.expected_quantity,
                    actual: item.actual_quantity,
                    discrepancy: item.discrepancy,
                    outcome: LineOutcome::of(item.discrepancy),
                }
            })
            .collect();

        Ok(AuditDetail {
            audit,
            total_items: lines.len(),
            total_loss,
            total_gain,
            items: lines,
        })
    }
}

fn summarize(
    audit: &shelf_audit::Model,
    lines: &[shelf_audit_item::Model],
    items_adjusted: usize,
    auto_adjusted: bool,
) -> AuditSummary {
    AuditSummary {
        audit_id: audit.id,
        status: audit.status,
        total_items: lines.len(),
        items_adjusted,
        total_discrepancy: lines.iter().map(|l| l.discrepancy.unsigned_abs()).sum(),
        auto_adjusted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{seed_product, store_db};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    async fn stock_of(db: &DatabaseConnection, id: Uuid) -> i32 {
        product::Entity::find_by_id(id).one(db).await.unwrap().unwrap().stock
    }

    fn counts(items: &[(Uuid, i32)], auto_adjust: Option<bool>) -> CompleteAuditRequest {
        CompleteAuditRequest {
            notes: Some("aisle 3".into()),
            items: items
                .iter()
                .map(|(product_id, actual_quantity)| AuditCount {
                    product_id: *product_id,
                    actual_quantity: *actual_quantity,
                })
                .collect(),
            auto_adjust,
        }
    }

    #[test]
    fn outcomes_follow_the_sign() {
        assert_eq!(LineOutcome::of(-2), LineOutcome::Loss);
        assert_eq!(LineOutcome::of(0), LineOutcome::Match);
        assert_eq!(LineOutcome::of(7), LineOutcome::Gain);
    }

    #[tokio::test]
    async fn completing_books_losses_and_gains() {
        let (_dir, db) = store_db().await;
        let beans = seed_product(&db, "Beans", 10, dec!(1), dec!(2)).await;
        let rice = seed_product(&db, "Rice", 4, dec!(1), dec!(2)).await;
        let oil = seed_product(&db, "Oil", 6, dec!(1), dec!(2)).await;
        let service = AuditService::new(db.clone());

        let started = service.start(None).await.unwrap();
        assert_eq!(started.audit.status, AuditStatus::InProgress);
        assert_eq!(started.expected_items_count, 3);

        let summary = service
            .complete(started.audit.id, counts(&[(beans.id, 7), (rice.id, 6), (oil.id, 6)], None))
            .await
            .unwrap();
        assert_eq!(summary.status, AuditStatus::Applied);
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.items_adjusted, 2);
        assert_eq!(summary.total_discrepancy, 5);
        assert!(summary.auto_adjusted);
        assert_eq!(stock_of(&db, beans.id).await, 7);
        assert_eq!(stock_of(&db, rice.id).await, 6);

        let movements = stock_movement::Entity::find()
            .filter(stock_movement::Column::MovementType.eq(MovementType::Audit))
            .all(&*db)
            .await
            .unwrap();
        assert_eq!(movements.len(), 2);

        let detail = service.details(started.audit.id).await.unwrap();
        assert_eq!(detail.total_loss, 3);
        assert_eq!(detail.total_gain, 2);
        assert_eq!(detail.audit.notes.as_deref(), Some("aisle 3"));
        let beans_line = detail.items.iter().find(|l| l.product_id == beans.id).unwrap();
        assert_eq!(beans_line.outcome, LineOutcome::Loss);
        assert_eq!(beans_line.product_name.as_deref(), Some("Beans"));

        assert_matches!(
            service.complete(started.audit.id, counts(&[(beans.id, 1)], None)).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn pending_audits_wait_for_review() {
        let (_dir, db) = store_db().await;
        let tea = seed_product(&db, "Tea", 10, dec!(1), dec!(2)).await;
        let service = AuditService::new(db.clone());

        let first = service.start(None).await.unwrap().audit.id;
        let summary = service
            .complete(first, counts(&[(tea.id, 8)], Some(false)))
            .await
            .unwrap();
        assert_eq!(summary.status, AuditStatus::Pending);
        assert_eq!(summary.items_adjusted, 0);
        assert_eq!(stock_of(&db, tea.id).await, 10);

        // a sale after the count is kept when the audit is applied
        assert!(decrement_stock(&*db, tea.id, 3).await.unwrap());
        let applied = service.apply(first).await.unwrap();
        assert_eq!(applied.status, AuditStatus::Applied);
        assert_eq!(applied.items_adjusted, 1);
        assert_eq!(stock_of(&db, tea.id).await, 5);
        assert_matches!(service.apply(first).await, Err(ServiceError::Conflict(_)));

        let second = service.start(None).await.unwrap().audit.id;
        service
            .complete(second, counts(&[(tea.id, 0)], Some(false)))
            .await
            .unwrap();
        let rejected = service.reject(second).await.unwrap();
        assert_eq!(rejected.status, AuditStatus::Rejected);
        assert_eq!(stock_of(&db, tea.id).await, 5);
        assert_matches!(service.reject(second).await, Err(ServiceError::Conflict(_)));

        let history = service.history(None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|h| h.items_count == 1));
    }

    #[tokio::test]
    async fn losses_beyond_stock_empty_the_shelf() {
        let (_dir, db) = store_db().await;
        let milk = seed_product(&db, "Milk", 5, dec!(1), dec!(2)).await;
        let service = AuditService::new(db.clone());

        let id = service.start(None).await.unwrap().audit.id;
        service
            .complete(id, counts(&[(milk.id, 1)], Some(false)))
            .await
            .unwrap();
        assert!(decrement_stock(&*db, milk.id, 3).await.unwrap());
        service.apply(id).await.unwrap();
        assert_eq!(stock_of(&db, milk.id).await, 0);
    }

    #[tokio::test]
    async fn bad_counts_are_rejected() {
        let (_dir, db) = store_db().await;
        let salt = seed_product(&db, "Salt", 5, dec!(1), dec!(2)).await;
        let service = AuditService::new(db.clone());
        let id = service.start(None).await.unwrap().audit.id;

        assert_matches!(
            service.complete(id, counts(&[(salt.id, 1), (salt.id, 2)], None)).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            service.complete(id, counts(&[(salt.id, -1)], None)).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            service.complete(id, counts(&[(Uuid::new_v4(), 1)], None)).await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(
            service.complete(Uuid::new_v4(), counts(&[(salt.id, 1)], None)).await,
            Err(ServiceError::NotFound(_))
        );
        // nothing was written by the failed attempts
        let detail = service.details(id).await.unwrap();
        assert_eq!(detail.audit.status, AuditStatus::InProgress);
        assert!(detail.items.is_empty());
    }
}
