use serde::{Deserialize, Serialize};

/// ログイン情報（`POST /api/auth/token` にフォーム形式で送信する）
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    /// メールアドレス
    pub username: String,
    pub password: String,
}

/// トークン発行レスポンス
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// 未ログイン
    Anonymous,
    /// ログイン済み
    Authenticated,
    /// 401を受けてトークンを破棄した（再ログインが必要）
    ReauthenticationRequired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_default_type() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(response.access_token, "abc");
        assert_eq!(response.token_type, "bearer");
    }

    #[test]
    fn test_session_state_serialization() {
        let json = serde_json::to_string(&SessionState::ReauthenticationRequired).unwrap();
        assert_eq!(json, "\"reauthentication_required\"");
    }
}
