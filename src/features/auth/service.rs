use crate::features::auth::models::{LoginCredentials, TokenResponse};
use crate::features::auth::session::SessionContext;
use crate::shared::api_client::ApiClient;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::validate_required_field;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// 認証サービス
///
/// トークンの取得と破棄のみを扱う。ログイン画面などのUIは対象外。
pub struct AuthService {
    client: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    fn session(&self) -> &Arc<SessionContext> {
        self.client.session()
    }

    /// ログインしてアクセストークンを保存する
    ///
    /// # 引数
    /// * `credentials` - メールアドレスとパスワード
    ///
    /// # 戻り値
    /// 成功時はOk(())、入力が不正な場合はValidationエラー、認証失敗時はAuthエラー
    pub async fn login(&self, credentials: &LoginCredentials) -> AppResult<()> {
        validate_credentials(credentials)?;

        let form = [
            ("username", credentials.username.trim().to_string()),
            ("password", credentials.password.clone()),
        ];

        let response: TokenResponse = self
            .client
            .post_form("/api/auth/token", &form)
            .await
            .map_err(|e| match e {
                // ログイン時の401は資格情報の誤り
                AppError::Auth(_) => {
                    AppError::Auth("メールアドレスまたはパスワードが正しくありません".to_string())
                }
                other => other,
            })?;

        if response.access_token.trim().is_empty() {
            return Err(AppError::external_service(
                "認証API",
                "空のアクセストークンが返されました",
            ));
        }

        self.session().set_token(response.access_token);
        log::info!("ログインしました: username={}", credentials.username.trim());
        Ok(())
    }

    /// ログアウトする
    pub fn logout(&self) {
        self.session().clear();
    }
}

/// ログイン情報を検証する
fn validate_credentials(credentials: &LoginCredentials) -> AppResult<()> {
    validate_required_field(&credentials.username, "メールアドレス")?;
    validate_required_field(&credentials.password, "パスワード")?;

    let username = credentials.username.trim();
    let is_email = match EMAIL_PATTERN.as_ref() {
        Some(pattern) => pattern.is_match(username),
        None => username.contains('@'),
    };

    if !is_email {
        return Err(AppError::validation(
            "メールアドレスの形式が正しくありません",
        ));
    }

    Ok(())
}
