use super::aggregator::{build_dashboard_summary, build_monthly_report, ReportPeriod};
use super::models::{DashboardSummary, MonthlyReport};
use crate::features::activities::models::{ActivityType, NewActivity};
use crate::features::activities::repository as activity_repository;
use crate::features::negotiations::repository as negotiation_repository;
use crate::features::recommendations::repository as recommendation_repository;
use crate::features::subscriptions::repository as subscription_repository;
use crate::shared::errors::AppResult;
use crate::shared::utils::format_amount;
use crate::AppState;
use chrono::Utc;
use serde_json::json;

/// 月次レポートを作成する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `month` - 月（1〜12）
/// * `year` - 年
/// * `record_activity` - report_generated のアクティビティを追加するか
///
/// # 戻り値
/// 月次レポート、または失敗時はエラー
pub fn generate_monthly_report(
    state: &AppState,
    month: u32,
    year: i32,
    record_activity: bool,
) -> AppResult<MonthlyReport> {
    let timezone = state.config.timezone;
    let period = ReportPeriod::new(month, year, timezone)?;
    let previous = period.previous(timezone)?;

    let db = state.lock_db()?;
    let now = Utc::now();

    let subscriptions = subscription_repository::find_all(&db, false)?;
    let negotiations = negotiation_repository::find_all(&db, None)?;
    let activities = activity_repository::find_between(&db, period.start, period.end)?;

    let report = build_monthly_report(
        &period,
        &previous,
        &subscriptions,
        &negotiations,
        &activities,
        now,
    );

    if record_activity {
        activity_repository::insert(
            &db,
            &NewActivity::new(ActivityType::ReportGenerated, "月次レポートを作成しました")
                .with_description(format!(
                    "{} {}: 月額合計 {}、アクティブなサブスクリプション {}件",
                    report.month,
                    report.year,
                    format_amount(report.total_monthly_spend),
                    report.active_subscriptions
                ))
                .with_meta_data(json!({ "month": month, "year": year })),
            now,
        )?;
    }

    log::info!(
        "月次レポートを作成しました: {year}-{month:02}, total={}",
        report.total_monthly_spend
    );
    Ok(report)
}

/// ダッシュボードの集計を取得する
pub fn get_dashboard_summary(state: &AppState) -> AppResult<DashboardSummary> {
    let db = state.lock_db()?;
    let subscriptions = subscription_repository::find_all(&db, false)?;
    let recommendations = recommendation_repository::find_all(&db)?;

    Ok(build_dashboard_summary(&subscriptions, &recommendations))
}
