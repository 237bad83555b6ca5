//! APIサーバー経由でのレコメンデーション（最適化）操作

use super::models::{ExecutionResult, OptimizationResults, Recommendation};
use super::presenter;
use crate::features::reports::models::DashboardSummary;
use crate::shared::api_client::{path_segment, ApiClient};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::in_flight::InFlightRegistry;
use log::info;
use std::sync::Arc;

/// 処理中レジストリでのレコメンデーションの種別名
const IN_FLIGHT_KIND: &str = "recommendation";

/// レコメンデーションAPI
#[derive(Clone)]
pub struct RecommendationApi {
    client: Arc<ApiClient>,
    in_flight: InFlightRegistry,
}

impl RecommendationApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self::with_registry(client, InFlightRegistry::new())
    }

    pub fn with_registry(client: Arc<ApiClient>, in_flight: InFlightRegistry) -> Self {
        Self { client, in_flight }
    }

    /// 未実行のレコメンデーションを表示順で取得する
    ///
    /// # 引数
    /// * `status` - サーバー側の絞り込み（例: "pending"）
    pub async fn list(&self, status: Option<&str>) -> AppResult<Vec<Recommendation>> {
        let recommendations: Vec<Recommendation> = match status {
            Some(status) => {
                self.client
                    .get_with_query("/api/optimizations/", &[("status", status.to_string())])
                    .await?
            }
            None => self.client.get("/api/optimizations/").await?,
        };

        info!("レコメンデーション一覧取得成功: count={}", recommendations.len());
        let pending = recommendations.into_iter().filter(|r| r.is_pending()).collect();
        Ok(presenter::rank(pending))
    }

    /// レコメンデーションを実行する
    ///
    /// 同じIDの実行が処理中の場合はInFlightエラー。失敗してもリトライしない。
    pub async fn execute(&self, id: &str) -> AppResult<ExecutionResult> {
        let _guard = self.in_flight.try_acquire(IN_FLIGHT_KIND, id)?;

        let result: ExecutionResult = self
            .client
            .post_empty(&format!("/api/optimizations/{}/execute", path_segment(id)), &[])
            .await?;

        if !result.success {
            return Err(AppError::ExternalService(format!(
                "最適化API: 実行が失敗として返されました: {}",
                result.message
            )));
        }

        info!("レコメンデーション実行成功: id={id}");
        Ok(result)
    }

    /// ダッシュボードの集計を取得する
    pub async fn dashboard_summary(&self) -> AppResult<DashboardSummary> {
        self.client.get("/api/optimizations/dashboard/summary").await
    }

    /// 最適化の実績を取得する
    pub async fn results(&self) -> AppResult<OptimizationResults> {
        self.client.get("/api/optimizations/results").await
    }
}
