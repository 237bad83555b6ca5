//! 汎用APIクライアント
//!
//! SubGuard APIサーバーとの通信を行う。各機能のAPIラッパー
//! （サブスクリプション・レコメンデーション・交渉・アクティビティ・レポート）から使用する。

use crate::features::auth::session::SessionContext;
use crate::shared::config::environment::ApiConfig;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::ids::generate_request_id;
use log::{debug, info, warn};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// リトライ間隔の初期値（試行ごとに2倍になる）
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// リクエストボディの種類
enum RequestBody<'a> {
    Empty,
    Json(serde_json::Value),
    Form(&'a [(&'a str, String)]),
}

/// 汎用APIクライアント
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    session: Arc<SessionContext>,
    retry_base_delay: Duration,
}

impl ApiClient {
    /// 設定を指定してAPIクライアントを作成
    ///
    /// # 引数
    /// * `config` - API設定
    /// * `session` - 認証トークンを保持するセッションコンテキスト
    ///
    /// # 戻り値
    /// APIクライアント、または設定が不正な場合はエラー
    pub fn new(config: ApiConfig, session: Arc<SessionContext>) -> AppResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::configuration(format!("HTTPクライアント初期化失敗: {e}")))?;

        Ok(Self {
            client,
            config,
            session,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        })
    }

    /// 環境変数の設定からAPIクライアントを作成
    pub fn from_env(session: Arc<SessionContext>) -> AppResult<Self> {
        Self::new(ApiConfig::from_env(), session)
    }

    /// リトライ間隔の初期値を変更する
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// セッションコンテキストを取得
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// GETリクエストを送信（通信エラー時はリトライする）
    pub async fn get<T>(&self, endpoint: &str) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        self.get_with_query(endpoint, &[]).await
    }

    /// クエリパラメータ付きGETリクエストを送信（通信エラー時はリトライする）
    pub async fn get_with_query<T>(&self, endpoint: &str, query: &[(&str, String)]) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let endpoint = append_query(endpoint, query);
        self.send(Method::GET, &endpoint, RequestBody::Empty, true)
            .await
    }

    /// POSTリクエストを送信（JSONボディ）
    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> AppResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, endpoint, RequestBody::Json(body), false)
            .await
    }

    /// ボディなしPOSTリクエストを送信
    pub async fn post_empty<T>(&self, endpoint: &str, query: &[(&str, String)]) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let endpoint = append_query(endpoint, query);
        self.send(Method::POST, &endpoint, RequestBody::Empty, false)
            .await
    }

    /// フォーム形式のPOSTリクエストを送信
    pub async fn post_form<T>(&self, endpoint: &str, form: &[(&str, String)]) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        self.send(Method::POST, endpoint, RequestBody::Form(form), false)
            .await
    }

    /// PUTリクエストを送信
    pub async fn put<B, T>(&self, endpoint: &str, body: &B) -> AppResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::PUT, endpoint, RequestBody::Json(body), false)
            .await
    }

    /// ボディなしPATCHリクエストを送信
    pub async fn patch_empty<T>(&self, endpoint: &str) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        self.send(Method::PATCH, endpoint, RequestBody::Empty, false)
            .await
    }

    /// DELETEリクエストを送信
    ///
    /// レスポンスボディは読み捨てる
    pub async fn delete(&self, endpoint: &str) -> AppResult<()> {
        let _: serde_json::Value = self
            .send(Method::DELETE, endpoint, RequestBody::Empty, false)
            .await?;
        Ok(())
    }

    /// リクエストを送信する
    ///
    /// `retry` が true の場合のみ、通信エラーを指数バックオフでリトライする。
    /// 変更系のリクエストは重複実行を避けるため呼び出し側にエラーを返す。
    async fn send<T>(
        &self,
        method: Method,
        endpoint: &str,
        body: RequestBody<'_>,
        retry: bool,
    ) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{endpoint}", self.config.base_url);
        let max_retries = if retry { self.config.max_retries } else { 0 };
        let mut attempts = 0;

        loop {
            // 401処理で比較するため、送信時のトークンを保持しておく
            let token = self.session.access_token();
            let request_id = generate_request_id();

            info!("{method}リクエスト送信: endpoint={endpoint}, request_id={request_id}");

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("x-request-id", &request_id);

            if let Some(token) = token.as_deref() {
                request = request.bearer_auth(token);
            }

            request = match &body {
                RequestBody::Empty => request,
                RequestBody::Json(value) => request.json(value),
                RequestBody::Form(form) => request.form(form),
            };

            let result = match request.send().await {
                Ok(response) => self.handle_response(response, token.as_deref()).await,
                Err(e) => Err(AppError::from(e)),
            };

            match result {
                Ok(value) => {
                    info!("{method}リクエスト成功: endpoint={endpoint}");
                    return Ok(value);
                }
                Err(error) if error.is_retryable() && attempts < max_retries => {
                    attempts += 1;
                    let delay = self.retry_base_delay * 2_u32.pow(attempts - 1);
                    warn!(
                        "APIリクエスト失敗、リトライします: attempt={attempts}/{max_retries}, delay={delay:?}, error={error}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    warn!("{method}リクエスト失敗: endpoint={endpoint}, error={error}");
                    return Err(error);
                }
            }
        }
    }

    /// レスポンスを解析する
    async fn handle_response<T>(&self, response: Response, token_used: Option<&str>) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();

        if status.is_success() {
            let text = response.text().await?;
            // 204やボディなしのレスポンスはnullとして解析する
            let text = if text.trim().is_empty() { "null" } else { &text };
            return serde_json::from_str(text).map_err(|e| {
                AppError::ExternalService(format!("レスポンス解析エラー: {e}"))
            });
        }

        if status == StatusCode::UNAUTHORIZED {
            self.session.handle_unauthorized(token_used);
            return Err(AppError::Auth("APIサーバーが401を返しました".to_string()));
        }

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let response_text = response
            .text()
            .await
            .unwrap_or_else(|_| "レスポンス読み取り失敗".to_string());

        debug!(
            "APIサーバーからエラーレスポンスを受信: status={status}, request_id={request_id}, body={response_text}"
        );

        Err(map_error_status(status, &extract_detail(&response_text)))
    }
}

/// パスに埋め込むIDをエンコードする
pub fn path_segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// エンドポイントにクエリ文字列を付与する
fn append_query(endpoint: &str, query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return endpoint.to_string();
    }

    let query_string = query
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{endpoint}?{query_string}")
}

/// エラーレスポンスから詳細メッセージを取り出す
///
/// `{"detail": "..."}` と、バリデーションエラーの `{"detail": [{"msg": "..."}]}` に対応する
fn extract_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };

    match value.get("detail") {
        Some(serde_json::Value::String(detail)) => detail.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
        None => body.trim().to_string(),
    }
}

/// HTTPステータスをアプリケーションエラーに変換する
fn map_error_status(status: StatusCode, detail: &str) -> AppError {
    let lower = detail.to_lowercase();

    match status.as_u16() {
        400 if lower.contains("already executed") => AppError::already_executed(detail),
        400 if lower.contains("expired") || lower.contains("not active") => {
            AppError::invalid_state(detail)
        }
        400 | 422 => AppError::validation(detail),
        401 => AppError::Auth(detail.to_string()),
        404 => AppError::NotFound(detail.to_string()),
        409 => AppError::in_flight(detail),
        code if (500..600).contains(&code) => {
            AppError::ExternalService(format!("APIサーバーエラー: {code} - {detail}"))
        }
        code => AppError::ExternalService(format!("予期しないステータス: {code} - {detail}")),
    }
}


#[cfg(test)]
pub(crate) fn test_client(base_url: &str, session: Arc<SessionContext>) -> ApiClient {
    let config = ApiConfig {
        base_url: base_url.to_string(),
        timeout_seconds: 5,
        max_retries: 3,
    };
    ApiClient::new(config, session)
        .unwrap()
        .with_retry_base_delay(Duration::from_millis(5))
}
