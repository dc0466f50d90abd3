use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::tenant::{
    expense,
    order::{self, PaymentStatus},
    order_item, product,
    sale::{self, SaleStatus},
    sale_item,
};
use crate::errors::ServiceError;
use crate::services::{money, percent_of};

pub const DEFAULT_SUMMARY_DAYS: i64 = 30;
pub const MAX_SUMMARY_DAYS: i64 = 365;
pub const DEFAULT_DAILY_DAYS: i64 = 7;
pub const MAX_DAILY_DAYS: i64 = 90;
pub const DEFAULT_TOP_PRODUCTS: usize = 10;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProfitReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub revenue: Decimal,
    pub sales_revenue: Decimal,
    pub order_revenue: Decimal,
    pub cogs: Decimal,
    pub expenses: Decimal,
    pub gross_profit: Decimal,
    pub net_profit: Decimal,
    pub gross_margin: Decimal,
    pub net_margin: Decimal,
    pub sale_count: usize,
    pub order_count: usize,
    pub expense_count: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DailyProfit {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub cogs: Decimal,
    pub expenses: Decimal,
    pub gross_profit: Decimal,
    pub net_profit: Decimal,
    pub sale_count: usize,
    pub order_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TrendMetric {
    pub current: Decimal,
    pub previous: Decimal,
    pub change_percent: Decimal,
    /// `up` when the change is zero or positive
    pub direction: String,
}

impl TrendMetric {
    pub fn compare(current: Decimal, previous: Decimal) -> Self {
        let change_percent = if previous <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            ((current - previous) / previous * Decimal::ONE_HUNDRED).round_dp(2)
        };
        Self {
            current,
            previous,
            direction: if change_percent >= Decimal::ZERO { "up" } else { "down" }.to_string(),
            change_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PeriodTrend {
    pub revenue: TrendMetric,
    pub net_profit: TrendMetric,
    pub sale_count: TrendMetric,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Trends {
    pub week: PeriodTrend,
    pub month: PeriodTrend,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub quantity_sold: i64,
    pub revenue: Decimal,
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Financial reporting over sales, paid orders and expenses
pub struct ReportService {
    db: Arc<DatabaseConnection>,
}

impl ReportService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn cost_prices(&self) -> Result<HashMap<Uuid, Decimal>, ServiceError> {
        Ok(product::Entity::find()
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.cost_price))
            .collect())
    }

    /// Revenue, cost of goods and expenses for `[start, end)`
    #[instrument(skip(self))]
    pub async fn calculate_profits(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ProfitReport, ServiceError> {
        let costs = self.cost_prices().await?;
        let cost_of = |product_id: &Uuid, quantity: i32| {
            costs.get(product_id).copied().unwrap_or_default() * Decimal::from(quantity)
        };

        let sales = sale::Entity::find()
            .filter(sale::Column::Status.eq(SaleStatus::Completed))
            .filter(sale::Column::CreatedAt.gte(start))
            .filter(sale::Column::CreatedAt.lt(end))
            .all(&*self.db)
            .await?;
        let sale_ids: Vec<Uuid> = sales.iter().map(|s| s.id).collect();
        let sale_cogs: Decimal = sale_item::Entity::find()
            .filter(sale_item::Column::SaleId.is_in(sale_ids))
            .all(&*self.db)
            .await?
            .iter()
            .map(|i| cost_of(&i.product_id, i.quantity))
            .sum();

        let orders = order::Entity::find()
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Paid))
            .filter(order::Column::CreatedAt.gte(start))
            .filter(order::Column::CreatedAt.lt(end))
            .all(&*self.db)
            .await?;
        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let order_cogs: Decimal = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(&*self.db)
            .await?
            .iter()
            .map(|i| cost_of(&i.product_id, i.quantity))
            .sum();

        let last_day = (end - Duration::nanoseconds(1)).date_naive();
        let expenses = expense::Entity::find()
            .filter(expense::Column::ExpenseDate.gte(start.date_naive()))
            .filter(expense::Column::ExpenseDate.lte(last_day))
            .all(&*self.db)
            .await?;

        let sales_revenue: Decimal = sales.iter().map(|s| s.total).sum();
        let order_revenue: Decimal = orders.iter().map(|o| o.total_amount).sum();
        let revenue = money(sales_revenue + order_revenue);
        let cogs = money(sale_cogs + order_cogs);
        let expense_total = money(expenses.iter().map(|e| e.amount).sum());
        let gross_profit = revenue - cogs;
        let net_profit = gross_profit - expense_total;

        Ok(ProfitReport {
            start,
            end,
            revenue,
            sales_revenue: money(sales_revenue),
            order_revenue: money(order_revenue),
            cogs,
            expenses: expense_total,
            gross_profit,
            net_profit,
            gross_margin: percent_of(gross_profit, revenue),
            net_margin: percent_of(net_profit, revenue),
            sale_count: sales.len(),
            order_count: orders.len(),
            expense_count: expenses.len(),
        })
    }

    /// The trailing `days` up to now
    pub async fn summary(&self, days: Option<i64>) -> Result<ProfitReport, ServiceError> {
        let days = days.unwrap_or(DEFAULT_SUMMARY_DAYS);
        if !(1..=MAX_SUMMARY_DAYS).contains(&days) {
            return Err(ServiceError::ValidationError(format!(
                "days must be between 1 and {}",
                MAX_SUMMARY_DAYS
            )));
        }
        let end = Utc::now();
        self.calculate_profits(end - Duration::days(days), end).await
    }

    /// One entry per calendar day, oldest first, ending today
    pub async fn daily(&self, days_back: Option<i64>) -> Result<Vec<DailyProfit>, ServiceError> {
        let days_back = days_back.unwrap_or(DEFAULT_DAILY_DAYS);
        if !(1..=MAX_DAILY_DAYS).contains(&days_back) {
            return Err(ServiceError::ValidationError(format!(
                "days_back must be between 1 and {}",
                MAX_DAILY_DAYS
            )));
        }

        let today = Utc::now().date_naive();
        let mut days = Vec::with_capacity(days_back as usize);
        for offset in (0..days_back).rev() {
            let date = today - Duration::days(offset);
            let start = day_start(date);
            let report = self.calculate_profits(start, start + Duration::days(1)).await?;
            days.push(DailyProfit {
                date,
                revenue: report.revenue,
                cogs: report.cogs,
                expenses: report.expenses,
                gross_profit: report.gross_profit,
                net_profit: report.net_profit,
                sale_count: report.sale_count,
                order_count: report.order_count,
            });
        }
        Ok(days)
    }

    async fn period_trend(&self, now: DateTime<Utc>, span: Duration) -> Result<PeriodTrend, ServiceError> {
        let current = self.calculate_profits(now - span, now).await?;
        let previous = self.calculate_profits(now - span - span, now - span).await?;
        Ok(PeriodTrend {
            revenue: TrendMetric::compare(current.revenue, previous.revenue),
            net_profit: TrendMetric::compare(current.net_profit, previous.net_profit),
            sale_count: TrendMetric::compare(
                Decimal::from(current.sale_count),
                Decimal::from(previous.sale_count),
            ),
        })
    }

    /// This week against last week, this month against last month
    #[instrument(skip(self))]
    pub async fn trends(&self) -> Result<Trends, ServiceError> {
        let now = Utc::now();
        Ok(Trends {
            week: self.period_trend(now, Duration::days(7)).await?,
            month: self.period_trend(now, Duration::days(30)).await?,
        })
    }

    /// Best sellers by revenue across completed sales
    pub async fn top_products(&self, limit: Option<usize>) -> Result<Vec<TopProduct>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_TOP_PRODUCTS).clamp(1, 100);
        let completed: Vec<Uuid> = sale::Entity::find()
            .filter(sale::Column::Status.eq(SaleStatus::Completed))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let mut totals: HashMap<Uuid, (i64, Decimal)> = HashMap::new();
        for item in sale_item::Entity::find()
            .filter(sale_item::Column::SaleId.is_in(completed))
            .all(&*self.db)
            .await?
        {
            let entry = totals.entry(item.product_id).or_default();
            entry.0 += i64::from(item.quantity);
            entry.1 += item.subtotal;
        }

        let names: HashMap<Uuid, String> = product::Entity::find()
            .filter(product::Column::Id.is_in(totals.keys().copied().collect::<Vec<_>>()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut ranked: Vec<TopProduct> = totals
            .into_iter()
            .map(|(product_id, (quantity_sold, revenue))| TopProduct {
                name: names.get(&product_id).cloned().unwrap_or_default(),
                product_id,
                quantity_sold,
                revenue: money(revenue),
            })
            .collect();
        ranked.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));
        ranked.truncate(limit);
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::tenant::sale::PaymentMethod;
    use crate::services::expenses::{CreateExpenseRequest, ExpenseService};
    use crate::services::orders::{CreateOrderRequest, OrderLineRequest, OrderService};
    use crate::services::sales::{CreateSaleRequest, SaleLineRequest, SaleService};
    use crate::services::testing::{seed_product, store_db};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case(dec!(150), dec!(100), dec!(50), "up")]
    #[test_case(dec!(80), dec!(100), dec!(-20), "down")]
    #[test_case(dec!(80), dec!(0), dec!(0), "up")]
    #[test_case(dec!(80), dec!(-10), dec!(0), "up")]
    fn trend_change(current: Decimal, previous: Decimal, change: Decimal, direction: &str) {
        let metric = TrendMetric::compare(current, previous);
        assert_eq!(metric.change_percent, change);
        assert_eq!(metric.direction, direction);
    }

    fn sale_of(product_id: Uuid, quantity: i32) -> CreateSaleRequest {
        CreateSaleRequest {
            items: vec![SaleLineRequest { product_id, quantity, unit_price: None }],
            customer_id: None,
            payment_method: PaymentMethod::Card,
            discount: None,
            amount_paid: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn profits_combine_sales_paid_orders_and_expenses() {
        let (_dir, db) = store_db().await;
        let coffee = seed_product(&db, "Coffee", 50, dec!(4), dec!(10)).await;
        SaleService::new(db.clone()).create_sale(sale_of(coffee.id, 2), None).await.unwrap();

        let orders = OrderService::new(db.clone());
        let paid = orders
            .create(CreateOrderRequest {
                customer_id: None,
                items: vec![OrderLineRequest { product_id: coffee.id, quantity: 3, unit_price: None }],
                notes: None,
            })
            .await
            .unwrap();
        orders.update_payment_status(paid.order.id, "paid").await.unwrap();
        orders
            .create(CreateOrderRequest {
                customer_id: None,
                items: vec![OrderLineRequest { product_id: coffee.id, quantity: 9, unit_price: None }],
                notes: None,
            })
            .await
            .unwrap();

        ExpenseService::new(db.clone())
            .create(CreateExpenseRequest {
                expense_date: Utc::now().date_naive(),
                category: "Supplies".into(),
                amount: dec!(5),
                description: None,
                payment_method: None,
                receipt_url: None,
            })
            .await
            .unwrap();

        let reports = ReportService::new(db);
        let summary = reports.summary(None).await.unwrap();
        // sale: 20.00 + 1.60 tax, paid order: 30.00
        assert_eq!(summary.revenue.round_dp(2), dec!(51.60));
        assert_eq!(summary.cogs.round_dp(2), dec!(20.00));
        assert_eq!(summary.expenses.round_dp(2), dec!(5.00));
        assert_eq!(summary.net_profit.round_dp(2), dec!(26.60));
        assert_eq!(summary.order_count, 1);
        assert_eq!(summary.expense_count, 1);

        let daily = reports.daily(Some(3)).await.unwrap();
        assert_eq!(daily.len(), 3);
        assert!(daily[0].date < daily[2].date);
        assert_eq!(daily[2].revenue.round_dp(2), dec!(51.60));
        assert_eq!(daily[0].revenue, Decimal::ZERO);

        let top = reports.top_products(None).await.unwrap();
        assert_eq!(top[0].name, "Coffee");
        assert_eq!(top[0].quantity_sold, 2);

        let trends = reports.trends().await.unwrap();
        assert_eq!(trends.week.revenue.direction, "up");
        assert_eq!(trends.week.revenue.change_percent, Decimal::ZERO);
    }

    #[tokio::test]
    async fn empty_store_has_zero_margins_and_rejects_bad_ranges() {
        let (_dir, db) = store_db().await;
        let reports = ReportService::new(db);
        let summary = reports.summary(Some(7)).await.unwrap();
        assert_eq!(summary.revenue, Decimal::ZERO);
        assert_eq!(summary.gross_margin, Decimal::ZERO);

        assert_matches!(reports.summary(Some(0)).await, Err(ServiceError::ValidationError(_)));
        assert_matches!(reports.summary(Some(366)).await, Err(ServiceError::ValidationError(_)));
        assert_matches!(reports.daily(Some(91)).await, Err(ServiceError::ValidationError(_)));
    }
}
