use crate::shared::utils::percentage_of;
use crate::shared::utils::serde_compat::lenient_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 月次レポート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub total_monthly_spend: f64,
    pub active_subscriptions: u64,
    /// 月内に成立した交渉の節約額合計
    pub total_savings: f64,
    pub negotiations_completed: u64,
    /// 月名（英語）
    pub month: String,
    pub year: i32,
    /// カテゴリごとの月額
    pub spending_by_category: BTreeMap<String, f64>,
    pub active_subscriptions_list: Vec<ReportSubscription>,
    /// 月内のアクティビティの種類ごとの件数
    pub activities_summary: BTreeMap<String, u64>,
    pub recent_activities: Vec<ReportActivity>,
    pub negotiations_summary: NegotiationsSummary,
    #[serde(default)]
    pub previous_month_comparison: Option<MonthComparison>,
}

impl MonthlyReport {
    /// カテゴリ別の内訳を金額の大きい順に返す
    ///
    /// 割合は月額合計に対する百分率（合計が0の場合は0）
    pub fn category_breakdown(&self) -> Vec<CategorySpending> {
        let mut breakdown: Vec<CategorySpending> = self
            .spending_by_category
            .iter()
            .map(|(category, amount)| CategorySpending {
                category: category.clone(),
                amount: *amount,
                percentage: percentage_of(*amount, self.total_monthly_spend),
            })
            .collect();

        breakdown.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        breakdown
    }
}

/// カテゴリ別の支出
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpending {
    pub category: String,
    pub amount: f64,
    pub percentage: f64,
}

/// レポートに載せるサブスクリプション
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSubscription {
    pub id: String,
    pub service_name: String,
    #[serde(default)]
    pub plan_name: String,
    /// 月額換算の料金
    pub monthly_cost: f64,
    pub category: String,
    pub status: String,
}

/// レポートに載せるアクティビティ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportActivity {
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "lenient_datetime")]
    pub created_at: DateTime<Utc>,
}

/// 交渉の集計
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NegotiationsSummary {
    pub total: u64,
    pub completed: u64,
    pub in_progress: u64,
    pub total_savings: f64,
}

/// 前月との比較
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthComparison {
    pub previous_month: u32,
    pub previous_year: i32,
    pub previous_spend: f64,
    pub spend_change: f64,
    pub spend_change_percent: f64,
}

/// ダッシュボードの集計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_monthly_spend: f64,
    pub total_subscriptions: u64,
    /// 未実行のレコメンデーションの節約額合計
    pub potential_savings: f64,
    pub optimizations_completed: u64,
    #[serde(default)]
    pub recent_activity: Vec<RecentOptimization>,
}

/// ダッシュボードに表示する最近のレコメンデーション
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentOptimization {
    pub id: String,
    pub action: String,
    pub savings: f64,
    #[serde(with = "lenient_datetime")]
    pub date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_server_report() {
        let json = r#"{
            "total_monthly_spend": 167.7,
            "active_subscriptions": 3,
            "total_savings": 22.0,
            "negotiations_completed": 1,
            "month": "March",
            "year": 2024,
            "spending_by_category": {"streaming": 67.8, "software": 99.9},
            "active_subscriptions_list": [],
            "activities_summary": {"subscription_added": 3},
            "recent_activities": [
                {"id": "a1", "type": "subscription_added", "title": "Netflix", "description": null,
                 "created_at": "2024-03-05T12:00:00"}
            ],
            "negotiations_summary": {"total": 1, "completed": 1, "in_progress": 0, "total_savings": 22.0}
        }"#;

        let report: MonthlyReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.recent_activities[0].activity_type, "subscription_added");
        assert!(report.previous_month_comparison.is_none());

        let breakdown = report.category_breakdown();
        assert_eq!(breakdown[0].category, "software");
        assert!((breakdown[0].percentage + breakdown[1].percentage - 100.0).abs() < 1e-9);
    }
}
