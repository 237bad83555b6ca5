//! APIサーバー経由での交渉操作
//!
//! 変更系の呼び出し（メッセージ送信・承諾・拒否）はリトライしない。
//! 同じ交渉への同時送信は処理中レジストリで拒否する。

use super::models::{
    AcceptResponse, ActionResponse, Negotiation, NegotiationPatch, NegotiationStatus, NewNegotiation,
};
use crate::shared::api_client::{path_segment, ApiClient};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::in_flight::InFlightRegistry;
use crate::shared::utils::validate_required_field;
use chrono::Utc;
use log::info;
use std::sync::Arc;

/// 処理中レジストリでの交渉の種別名
const IN_FLIGHT_KIND: &str = "negotiation";

/// 交渉API
#[derive(Clone)]
pub struct NegotiationApi {
    client: Arc<ApiClient>,
    in_flight: InFlightRegistry,
}

impl NegotiationApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self::with_registry(client, InFlightRegistry::new())
    }

    /// 他のAPIラッパーと処理中レジストリを共有して作成する
    pub fn with_registry(client: Arc<ApiClient>, in_flight: InFlightRegistry) -> Self {
        Self { client, in_flight }
    }

    /// 交渉一覧を取得する
    ///
    /// サーバーは expired を保存しないため、期限は取得後に判定して絞り込む
    ///
    /// # 引数
    /// * `status` - 指定した場合は実効状態で絞り込む
    pub async fn list(&self, status: Option<NegotiationStatus>) -> AppResult<Vec<Negotiation>> {
        let server_filter = status.filter(|s| *s != NegotiationStatus::Expired);
        let negotiations: Vec<Negotiation> = match server_filter {
            Some(status) => {
                self.client
                    .get_with_query("/api/negotiations/", &[("status", status.as_str().to_string())])
                    .await?
            }
            None => self.client.get("/api/negotiations/").await?,
        };

        let now = Utc::now();
        let negotiations: Vec<Negotiation> = negotiations
            .into_iter()
            .map(|n| n.presented(now))
            .filter(|n| status.map_or(true, |s| n.status == s))
            .collect();

        info!("交渉一覧取得成功: count={}", negotiations.len());
        Ok(negotiations)
    }

    /// 交渉を取得する（期限切れは expired として返す）
    pub async fn get(&self, id: &str) -> AppResult<Negotiation> {
        let negotiation: Negotiation = self
            .client
            .get(&format!("/api/negotiations/{}", path_segment(id)))
            .await?;
        Ok(negotiation.presented(Utc::now()))
    }

    /// 交渉を作成する
    pub async fn create(&self, new: &NewNegotiation) -> AppResult<Negotiation> {
        validate_required_field(&new.provider_name, "プロバイダー名")?;
        let negotiation: Negotiation = self.client.post("/api/negotiations/", new).await?;
        Ok(negotiation.presented(Utc::now()))
    }

    /// メッセージを送信する
    ///
    /// # 戻り値
    /// サーバーが返した会話全体（メッセージ列と最終オファー）
    pub async fn send_message(&self, id: &str, text: &str) -> AppResult<NegotiationPatch> {
        validate_required_field(text, "メッセージ")?;
        let _guard = self.in_flight.try_acquire(IN_FLIGHT_KIND, id)?;

        let patch: NegotiationPatch = self
            .client
            .post_empty(
                &format!("/api/negotiations/{}/message", path_segment(id)),
                &[("message", text.trim().to_string())],
            )
            .await?;

        info!(
            "交渉メッセージ送信成功: id={id}, messages={}",
            patch.messages.len()
        );
        Ok(patch)
    }

    /// 最終オファーを承諾する
    pub async fn accept(&self, id: &str) -> AppResult<AcceptResponse> {
        let _guard = self.in_flight.try_acquire(IN_FLIGHT_KIND, id)?;

        let response: AcceptResponse = self
            .client
            .post_empty(&format!("/api/negotiations/{}/accept", path_segment(id)), &[])
            .await?;

        ensure_success(response.success, &response.message)?;
        Ok(response)
    }

    /// 交渉を拒否する
    pub async fn reject(&self, id: &str) -> AppResult<()> {
        let response: ActionResponse = self
            .client
            .post_empty(&format!("/api/negotiations/{}/reject", path_segment(id)), &[])
            .await?;

        ensure_success(response.success, &response.message)
    }
}

fn ensure_success(success: bool, message: &str) -> AppResult<()> {
    if success {
        return Ok(());
    }
    Err(AppError::ExternalService(format!(
        "交渉API: 失敗として返されました: {message}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::session::SessionContext;
    use crate::shared::api_client::{test_client, test_server};
    use std::time::Duration;

    const PATCH_JSON: &str = r#"{
        "messages": [
            {"role": "provider", "content": "Olá!", "timestamp": "2024-03-01T10:00:00"},
            {"role": "user", "content": "Quero desconto", "timestamp": "2024-03-01T10:01:00"},
            {"role": "provider", "content": "Posso oferecer 15%", "timestamp": "2024-03-01T10:01:01"}
        ],
        "final_offer": {"plan": "Premium", "price": 47.5, "savings": 8.4, "terms": "12 meses"}
    }"#;

    fn api_for(base_url: &str) -> NegotiationApi {
        let session = Arc::new(SessionContext::with_token("token"));
        NegotiationApi::new(Arc::new(test_client(base_url, session)))
    }

    #[tokio::test]
    async fn test_send_message_encodes_query() {
        let server = test_server::spawn(200, PATCH_JSON).await;

        let patch = api_for(&server.base_url)
            .send_message("neg-1", "Quero 20% de desconto")
            .await
            .unwrap();

        assert_eq!(patch.messages.len(), 3);
        assert_eq!(patch.final_offer.unwrap().savings, 8.4);
        let recorded = server.recorded();
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(
            recorded[0].path,
            "/api/negotiations/neg-1/message?message=Quero%2020%25%20de%20desconto"
        );
    }

    #[tokio::test]
    async fn test_send_message_is_not_retried() {
        let server = test_server::spawn(0, "").await;

        let result = api_for(&server.base_url).send_message("neg-1", "Olá").await;

        assert!(matches!(result, Err(AppError::Network(_))));
        assert_eq!(server.hit_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_message_is_not_sent() {
        let server = test_server::spawn(200, PATCH_JSON).await;

        let result = api_for(&server.base_url).send_message("neg-1", "  ").await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(server.hit_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_send_on_same_id_is_rejected() {
        let server = test_server::spawn(200, PATCH_JSON).await;
        let api = api_for(&server.base_url);

        let guard = api.in_flight.try_acquire(IN_FLIGHT_KIND, "neg-1").unwrap();
        let result = api.send_message("neg-1", "Olá").await;
        assert!(matches!(result, Err(AppError::InFlight(_))));

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), api.send_message("neg-1", "Olá"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(server.hit_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_negotiation_maps_to_invalid_state() {
        let server = test_server::spawn(400, r#"{"detail": "Negotiation expired"}"#).await;

        let result = api_for(&server.base_url).send_message("neg-1", "Olá").await;

        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_accept_and_reject() {
        let server = test_server::spawn_with(|request| {
            if request.path.ends_with("/accept") {
                (
                    200,
                    r#"{"success": true, "message": "Offer accepted",
                        "final_offer": {"plan": "Premium", "price": 6.0, "savings": 6.0, "terms": "12-month"}}"#
                        .to_string(),
                )
            } else {
                (200, r#"{"success": true, "message": "Negotiation rejected"}"#.to_string())
            }
        })
        .await;
        let api = api_for(&server.base_url);

        let accepted = api.accept("neg-1").await.unwrap();
        assert_eq!(accepted.final_offer.unwrap().savings, 6.0);
        api.reject("neg-2").await.unwrap();

        let recorded = server.recorded();
        assert_eq!(recorded[0].path, "/api/negotiations/neg-1/accept");
        assert_eq!(recorded[1].path, "/api/negotiations/neg-2/reject");
    }

    #[tokio::test]
    async fn test_list_with_status_filter() {
        let server = test_server::spawn(200, "[]").await;

        let negotiations = api_for(&server.base_url)
            .list(Some(NegotiationStatus::Active))
            .await
            .unwrap();

        assert!(negotiations.is_empty());
        assert_eq!(server.recorded()[0].path, "/api/negotiations/?status=active");
    }

    const STORED_ACTIVE_JSON: &str = r#"[
        {"id": "neg-old", "subscription_id": "s1", "provider_name": "Netflix", "status": "active",
         "messages": [], "created_at": "2020-01-01T00:00:00", "updated_at": "2020-01-01T00:00:00",
         "expires_at": "2020-01-08T00:00:00"},
        {"id": "neg-new", "subscription_id": "s2", "provider_name": "Spotify", "status": "active",
         "messages": [], "created_at": "2024-03-01T00:00:00", "updated_at": "2024-03-01T00:00:00",
         "expires_at": "2999-01-01T00:00:00"}
    ]"#;

    #[tokio::test]
    async fn test_list_derives_expiry_from_server_records() {
        let server = test_server::spawn(200, STORED_ACTIVE_JSON).await;
        let api = api_for(&server.base_url);

        let all = api.list(None).await.unwrap();
        assert_eq!(all[0].status, NegotiationStatus::Expired);
        assert_eq!(all[1].status, NegotiationStatus::Active);

        let expired = api.list(Some(NegotiationStatus::Expired)).await.unwrap();
        let ids: Vec<&str> = expired.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["neg-old"]);
        assert_eq!(server.recorded()[1].path, "/api/negotiations/");

        let active = api.list(Some(NegotiationStatus::Active)).await.unwrap();
        let ids: Vec<&str> = active.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["neg-new"]);
    }

    #[tokio::test]
    async fn test_get_presents_expired_status() {
        let server = test_server::spawn(
            200,
            r#"{"id": "neg-old", "subscription_id": "s1", "provider_name": "Netflix", "status": "active",
                "created_at": "2020-01-01T00:00:00", "updated_at": "2020-01-01T00:00:00",
                "expires_at": "2020-01-08T00:00:00"}"#,
        )
        .await;

        let negotiation = api_for(&server.base_url).get("neg-old").await.unwrap();

        assert_eq!(negotiation.status, NegotiationStatus::Expired);
    }
}
