//! 月次レポートとダッシュボードの集計
//!
//! 読み込み済みのレコードだけを入力とする純粋関数で構成する。
//! 月の境界は設定のタイムゾーンで決める。

use super::models::{
    DashboardSummary, MonthComparison, MonthlyReport, NegotiationsSummary, RecentOptimization,
    ReportActivity, ReportSubscription,
};
use crate::features::activities::models::Activity;
use crate::features::negotiations::models::{Negotiation, NegotiationStatus};
use crate::features::recommendations::models::Recommendation;
use crate::features::subscriptions::models::Subscription;
use crate::features::subscriptions::repository::monthly_total_of;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{percentage_of, round_currency};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;

/// レポートに載せる最近のアクティビティの件数
const RECENT_ACTIVITY_LIMIT: usize = 10;

/// レポート対象の暦月（開始を含み終了を含まない）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub month: u32,
    pub year: i32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportPeriod {
    /// 指定したタイムゾーンの暦月を作成する
    ///
    /// # 引数
    /// * `month` - 月（1〜12）
    /// * `year` - 年
    /// * `timezone` - 月の境界を決めるタイムゾーン
    ///
    /// # 戻り値
    /// 期間、または月が範囲外の場合はValidationエラー
    pub fn new(month: u32, year: i32, timezone: Tz) -> AppResult<Self> {
        let first = first_day(month, year)?;
        let next = if month == 12 {
            first_day(1, year + 1)?
        } else {
            first_day(month + 1, year)?
        };

        Ok(Self {
            month,
            year,
            start: local_midnight(timezone, first)?,
            end: local_midnight(timezone, next)?,
        })
    }

    /// 前月の期間
    pub fn previous(&self, timezone: Tz) -> AppResult<Self> {
        if self.month == 1 {
            Self::new(12, self.year - 1, timezone)
        } else {
            Self::new(self.month - 1, self.year, timezone)
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// 月名（英語）
    pub fn month_name(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.format("%B").to_string())
            .unwrap_or_default()
    }
}

fn first_day(month: u32, year: i32) -> AppResult<NaiveDate> {
    if !(1..=12).contains(&month) {
        return Err(AppError::validation(format!(
            "月は1から12の範囲で指定してください: {month}"
        )));
    }

    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::validation(format!("無効な年月です: {year}-{month}")))
}

/// 現地時間の0時をUTCに変換する（夏時間で0時が存在しない日は1時）
fn local_midnight(timezone: Tz, date: NaiveDate) -> AppResult<DateTime<Utc>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::validation(format!("無効な日付です: {date}")))?;

    timezone
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            timezone
                .from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| AppError::validation(format!("現地時刻に変換できません: {date}")))
}

/// 月次レポートを作成する
///
/// # 引数
/// * `period` - 対象月
/// * `previous` - 前月（比較用）
/// * `subscriptions` - すべてのサブスクリプション
/// * `negotiations` - すべての交渉
/// * `activities` - 対象月を含むアクティビティ
/// * `now` - 交渉の期限切れ判定に使う現在時刻
pub fn build_monthly_report(
    period: &ReportPeriod,
    previous: &ReportPeriod,
    subscriptions: &[Subscription],
    negotiations: &[Negotiation],
    activities: &[Activity],
    now: DateTime<Utc>,
) -> MonthlyReport {
    let active: Vec<&Subscription> = subscriptions.iter().filter(|s| s.is_active()).collect();
    let total_monthly_spend = monthly_total_of(subscriptions);

    let mut spending_by_category: BTreeMap<String, f64> = BTreeMap::new();
    for subscription in &active {
        *spending_by_category
            .entry(subscription.service_category.clone())
            .or_insert(0.0) += subscription.normalized_monthly_cost();
    }
    for amount in spending_by_category.values_mut() {
        *amount = round_currency(*amount);
    }

    let active_subscriptions_list = active
        .iter()
        .map(|s| ReportSubscription {
            id: s.id.clone(),
            service_name: s.service_name.clone(),
            plan_name: s.plan_name.clone(),
            monthly_cost: round_currency(s.normalized_monthly_cost()),
            category: s.service_category.clone(),
            status: s.status.as_str().to_string(),
        })
        .collect();

    let mut in_month: Vec<&Activity> = activities
        .iter()
        .filter(|a| period.contains(a.created_at))
        .collect();
    in_month.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut activities_summary: BTreeMap<String, u64> = BTreeMap::new();
    for activity in &in_month {
        *activities_summary
            .entry(activity.activity_type.as_str().to_string())
            .or_insert(0) += 1;
    }

    let recent_activities = in_month
        .iter()
        .take(RECENT_ACTIVITY_LIMIT)
        .map(|a| ReportActivity {
            id: a.id.clone(),
            activity_type: a.activity_type.as_str().to_string(),
            title: a.title.clone(),
            description: a.description.clone(),
            created_at: a.created_at,
        })
        .collect();

    let negotiations_summary = summarize_negotiations(period, negotiations, now);

    let previous_spend = round_currency(
        active
            .iter()
            .filter(|s| s.created_at < period.start)
            .map(|s| s.normalized_monthly_cost())
            .sum(),
    );
    let spend_change = round_currency(total_monthly_spend - previous_spend);

    MonthlyReport {
        total_monthly_spend,
        active_subscriptions: active.len() as u64,
        total_savings: negotiations_summary.total_savings,
        negotiations_completed: negotiations_summary.completed,
        month: period.month_name(),
        year: period.year,
        spending_by_category,
        active_subscriptions_list,
        activities_summary,
        recent_activities,
        negotiations_summary,
        previous_month_comparison: Some(MonthComparison {
            previous_month: previous.month,
            previous_year: previous.year,
            previous_spend,
            spend_change,
            spend_change_percent: round_currency(percentage_of(spend_change, previous_spend)),
        }),
    }
}

/// 対象月の交渉を集計する
///
/// 件数は月内に作成された交渉、節約額は月内に承諾された交渉の最終オファーから数える
fn summarize_negotiations(
    period: &ReportPeriod,
    negotiations: &[Negotiation],
    now: DateTime<Utc>,
) -> NegotiationsSummary {
    let created: Vec<&Negotiation> = negotiations
        .iter()
        .filter(|n| period.contains(n.created_at))
        .collect();

    let accepted: Vec<f64> = negotiations
        .iter()
        .filter(|n| n.status == NegotiationStatus::Accepted && period.contains(n.updated_at))
        .filter_map(|n| n.final_offer.as_ref().map(|offer| offer.savings))
        .collect();

    NegotiationsSummary {
        total: created.len() as u64,
        completed: accepted.len() as u64,
        in_progress: created
            .iter()
            .filter(|n| n.effective_status(now) == NegotiationStatus::Active)
            .count() as u64,
        total_savings: round_currency(accepted.iter().sum()),
    }
}

/// ダッシュボードの集計を作成する
///
/// # 引数
/// * `subscriptions` - すべてのサブスクリプション
/// * `recommendations` - すべてのレコメンデーション（実行済みを含む）
pub fn build_dashboard_summary(
    subscriptions: &[Subscription],
    recommendations: &[Recommendation],
) -> DashboardSummary {
    let potential_savings: f64 = recommendations
        .iter()
        .filter(|r| r.is_pending() && r.monthly_savings > 0.0)
        .map(|r| r.monthly_savings)
        .sum();

    let mut recent: Vec<&Recommendation> = recommendations.iter().collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    DashboardSummary {
        total_monthly_spend: monthly_total_of(subscriptions),
        total_subscriptions: subscriptions.iter().filter(|s| s.is_active()).count() as u64,
        potential_savings: round_currency(potential_savings),
        optimizations_completed: recommendations.iter().filter(|r| r.executed).count() as u64,
        recent_activity: recent
            .into_iter()
            .take(RECENT_ACTIVITY_LIMIT)
            .map(|r| RecentOptimization {
                id: r.id.clone(),
                action: r.action_type.as_str().to_string(),
                savings: r.monthly_savings,
                date: r.created_at,
            })
            .collect(),
    }
}
