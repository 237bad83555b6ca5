//! APIサーバー経由でのサブスクリプション操作

use super::models::{CreateSubscriptionDto, Subscription, UpdateSubscriptionDto};
use crate::features::recommendations::models::{AnalysisResponse, SubscriptionAnalysis};
use crate::shared::api_client::{path_segment, ApiClient};
use crate::shared::errors::AppResult;
use log::info;
use std::sync::Arc;

/// サブスクリプションAPI
#[derive(Clone)]
pub struct SubscriptionApi {
    client: Arc<ApiClient>,
}

impl SubscriptionApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// サブスクリプション一覧を取得する
    pub async fn list(&self) -> AppResult<Vec<Subscription>> {
        let subscriptions: Vec<Subscription> = self.client.get("/api/subscriptions/").await?;
        info!("サブスクリプション一覧取得成功: count={}", subscriptions.len());
        Ok(subscriptions)
    }

    /// サブスクリプションを作成する
    pub async fn create(&self, dto: &CreateSubscriptionDto) -> AppResult<Subscription> {
        let created: Subscription = self.client.post("/api/subscriptions/", dto).await?;
        info!("サブスクリプション作成成功: id={}", created.id);
        Ok(created)
    }

    /// サブスクリプションを更新する（指定した項目のみ送信する）
    pub async fn update(&self, id: &str, dto: &UpdateSubscriptionDto) -> AppResult<Subscription> {
        self.client
            .put(&format!("/api/subscriptions/{}", path_segment(id)), dto)
            .await
    }

    /// サブスクリプションを削除する
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.client
            .delete(&format!("/api/subscriptions/{}", path_segment(id)))
            .await?;
        info!("サブスクリプション削除成功: id={id}");
        Ok(())
    }

    /// サブスクリプションのAI分析を依頼する
    ///
    /// # 戻り値
    /// 分析結果（レコメンデーションの元になる）
    pub async fn analyze(&self, id: &str) -> AppResult<SubscriptionAnalysis> {
        let response: AnalysisResponse = self
            .client
            .post_empty(
                &format!("/api/subscriptions/{}/analyze", path_segment(id)),
                &[],
            )
            .await?;
        Ok(response.analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::session::SessionContext;
    use crate::features::recommendations::models::ActionType;
    use crate::shared::api_client::{test_client, test_server};
    use crate::shared::errors::AppError;

    const SUBSCRIPTION_JSON: &str = r#"{
        "id": "sub-1", "service_name": "Netflix", "service_category": "streaming",
        "plan_name": "Premium", "monthly_cost": 55.9, "billing_cycle": "monthly",
        "status": "active", "created_at": "2024-03-01T10:00:00", "updated_at": "2024-03-01T10:00:00"
    }"#;

    fn api_for(base_url: &str) -> SubscriptionApi {
        let session = Arc::new(SessionContext::with_token("token"));
        SubscriptionApi::new(Arc::new(test_client(base_url, session)))
    }

    #[tokio::test]
    async fn test_create_posts_json() {
        let server = test_server::spawn(200, SUBSCRIPTION_JSON).await;

        let mut dto = CreateSubscriptionDto::new("Netflix", 55.9);
        dto.plan_name = "Premium".to_string();
        let created = api_for(&server.base_url).create(&dto).await.unwrap();

        assert_eq!(created.id, "sub-1");
        let recorded = server.recorded();
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(recorded[0].path, "/api/subscriptions/");
        let body: serde_json::Value = serde_json::from_str(&recorded[0].body).unwrap();
        assert_eq!(body["service_name"], "Netflix");
        assert_eq!(body["monthly_cost"], 55.9);
    }

    #[tokio::test]
    async fn test_update_sends_only_supplied_fields() {
        let server = test_server::spawn(200, SUBSCRIPTION_JSON).await;

        let dto = UpdateSubscriptionDto {
            plan_name: Some("Premium".to_string()),
            ..Default::default()
        };
        api_for(&server.base_url).update("sub-1", &dto).await.unwrap();

        let recorded = server.recorded();
        assert_eq!(recorded[0].method, "PUT");
        assert_eq!(recorded[0].path, "/api/subscriptions/sub-1");
        let body: serde_json::Value = serde_json::from_str(&recorded[0].body).unwrap();
        assert_eq!(body, serde_json::json!({"plan_name": "Premium"}));
    }

    #[tokio::test]
    async fn test_delete_unknown_maps_to_not_found() {
        let server = test_server::spawn(404, r#"{"detail": "Subscription not found"}"#).await;

        let result = api_for(&server.base_url).delete("missing").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(server.recorded()[0].method, "DELETE");
    }

    #[tokio::test]
    async fn test_analyze_unwraps_analysis() {
        let server = test_server::spawn(
            200,
            r#"{"analysis": {"recommendation_type": "downgrade", "monthly_savings": 16.77,
                "confidence": 0.85, "reasoning": "Uso baixo", "suggested_plan": "Plano Básico",
                "action_steps": ["Acesse as configurações", "Escolha o plano básico"]}}"#,
        )
        .await;

        let analysis = api_for(&server.base_url).analyze("sub-1").await.unwrap();

        assert_eq!(analysis.recommendation_type, ActionType::Downgrade);
        assert_eq!(analysis.suggested_plan.as_deref(), Some("Plano Básico"));
        assert_eq!(analysis.action_steps.len(), 2);
        assert_eq!(server.recorded()[0].path, "/api/subscriptions/sub-1/analyze");
    }
}
