//! APIサーバー経由でのレポート取得

use super::aggregator::ReportPeriod;
use super::models::MonthlyReport;
use crate::shared::api_client::ApiClient;
use crate::shared::errors::AppResult;
use log::info;
use std::sync::Arc;

/// レポートAPI
#[derive(Clone)]
pub struct ReportApi {
    client: Arc<ApiClient>,
}

impl ReportApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// 月次レポートを取得する
    ///
    /// 月の範囲はリクエスト前に確認する（サーバーにはタイムゾーンを渡さない）
    pub async fn monthly(&self, month: u32, year: i32) -> AppResult<MonthlyReport> {
        ReportPeriod::new(month, year, chrono_tz::UTC)?;

        let report: MonthlyReport = self
            .client
            .get_with_query(
                "/api/reports/monthly",
                &[("month", month.to_string()), ("year", year.to_string())],
            )
            .await?;

        info!("月次レポート取得成功: {} {}", report.month, report.year);
        Ok(report)
    }
}
