//! APIサーバー経由でのアクティビティ操作

use super::models::{Activity, NewActivity, UnreadCount};
use super::poller::UnreadCountSource;
use crate::shared::api_client::{path_segment, ApiClient};
use crate::shared::errors::{AppError, AppResult};
use futures::future::BoxFuture;
use log::info;
use serde::Deserialize;
use std::sync::Arc;

/// 既読化レスポンス
#[derive(Debug, Deserialize)]
struct MarkReadResponse {
    #[serde(default)]
    success: bool,
}

/// アクティビティAPI
#[derive(Clone)]
pub struct ActivityApi {
    client: Arc<ApiClient>,
}

impl ActivityApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// アクティビティ一覧を取得する（新しい順）
    ///
    /// # 引数
    /// * `limit` - 取得件数
    pub async fn list(&self, limit: u32) -> AppResult<Vec<Activity>> {
        let activities: Vec<Activity> = self
            .client
            .get_with_query("/api/activities/", &[("limit", limit.to_string())])
            .await?;

        info!("アクティビティ一覧取得成功: count={}", activities.len());
        Ok(activities)
    }

    /// 未読件数を取得する
    pub async fn unread_count(&self) -> AppResult<u64> {
        let response: UnreadCount = self.client.get("/api/activities/unread-count").await?;
        Ok(response.count)
    }

    /// アクティビティを既読にする
    pub async fn mark_read(&self, id: &str) -> AppResult<()> {
        let response: MarkReadResponse = self
            .client
            .patch_empty(&format!("/api/activities/{}/read", path_segment(id)))
            .await?;

        if !response.success {
            return Err(AppError::external_service(
                "アクティビティAPI",
                "既読化が失敗として返されました",
            ));
        }
        Ok(())
    }

    /// アクティビティを作成する
    ///
    /// サーバーは meta_data をJSON文字列として受け取る
    pub async fn create(&self, activity: &NewActivity) -> AppResult<Activity> {
        let meta_data = activity
            .meta_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let body = serde_json::json!({
            "activity_type": activity.activity_type.as_str(),
            "title": activity.title,
            "description": activity.description,
            "meta_data": meta_data,
        });

        self.client.post("/api/activities/", &body).await
    }
}

impl UnreadCountSource for ActivityApi {
    fn unread_count(&self) -> BoxFuture<'_, AppResult<u64>> {
        Box::pin(ActivityApi::unread_count(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::activities::models::ActivityType;
    use crate::features::auth::session::SessionContext;
    use crate::shared::api_client::{test_client, test_server};

    fn api_for(base_url: &str) -> ActivityApi {
        let session = Arc::new(SessionContext::with_token("token"));
        ActivityApi::new(Arc::new(test_client(base_url, session)))
    }

    #[tokio::test]
    async fn test_list_passes_limit() {
        let server = test_server::spawn(
            200,
            r#"[{"id": "a-1", "activity_type": "ai_analysis", "title": "Análise", "description": null,
                 "meta_data": null, "created_at": "2024-03-01T10:00:00", "read": 0}]"#,
        )
        .await;

        let activities = api_for(&server.base_url).list(5).await.unwrap();

        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, ActivityType::AiAnalysis);
        assert_eq!(server.recorded()[0].path, "/api/activities/?limit=5");
    }

    #[tokio::test]
    async fn test_unread_count_and_mark_read() {
        let server = test_server::spawn_with(|request| {
            if request.path.ends_with("/unread-count") {
                (200, r#"{"count": 7}"#.to_string())
            } else {
                (200, r#"{"success": true}"#.to_string())
            }
        })
        .await;
        let api = api_for(&server.base_url);

        assert_eq!(api.unread_count().await.unwrap(), 7);
        api.mark_read("a-1").await.unwrap();

        let recorded = server.recorded();
        assert_eq!(recorded[1].method, "PATCH");
        assert_eq!(recorded[1].path, "/api/activities/a-1/read");
    }

    #[tokio::test]
    async fn test_mark_read_not_found() {
        let server = test_server::spawn(404, r#"{"detail": "Activity not found"}"#).await;

        let result = api_for(&server.base_url).mark_read("missing").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_sends_meta_data_as_string() {
        let server = test_server::spawn(
            200,
            r#"{"id": "a-9", "activity_type": "email_connected", "title": "Gmail",
                "created_at": "2024-03-01T10:00:00Z", "read": 0}"#,
        )
        .await;

        let new = NewActivity::new(ActivityType::EmailConnected, "Gmail")
            .with_meta_data(serde_json::json!({"provider": "gmail"}));
        let created = api_for(&server.base_url).create(&new).await.unwrap();
        assert_eq!(created.id, "a-9");

        let body: serde_json::Value =
            serde_json::from_str(&server.recorded()[0].body).unwrap();
        assert_eq!(body["meta_data"], r#"{"provider":"gmail"}"#);
    }
}
