use crate::features::auth::models::SessionState;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

/// API呼び出しで共有するセッションコンテキスト
///
/// アクセストークンはグローバル変数ではなくこの構造体が保持し、
/// `ApiClient` と各APIラッパーへ `Arc` で明示的に渡す。
#[derive(Debug)]
pub struct SessionContext {
    token: RwLock<Option<String>>,
    state_tx: watch::Sender<SessionState>,
    teardown_count: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    exp: Option<i64>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// 未ログイン状態のセッションを作成する
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(SessionState::Anonymous);
        Self {
            token: RwLock::new(None),
            state_tx,
            teardown_count: AtomicUsize::new(0),
        }
    }

    /// トークンを保持したセッションを作成する
    pub fn with_token<S: Into<String>>(token: S) -> Self {
        let session = Self::new();
        session.set_token(token);
        session
    }

    /// ログイン成功時にトークンを保存する
    pub fn set_token<S: Into<String>>(&self, token: S) {
        *self.write_token() = Some(token.into());
        self.state_tx.send_replace(SessionState::Authenticated);
        log::info!("アクセストークンを保存しました");
    }

    /// 現在のアクセストークンを取得する
    pub fn access_token(&self) -> Option<String> {
        self.read_token().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_token().is_some()
    }

    /// ログアウトする（トークンを破棄して未ログイン状態に戻す）
    pub fn clear(&self) {
        *self.write_token() = None;
        self.state_tx.send_replace(SessionState::Anonymous);
        log::info!("ログアウトしました");
    }

    /// 401レスポンスを受けたときのセッション破棄
    ///
    /// リクエストに使ったトークンがまだ保持されている場合のみ破棄する。
    /// 同じトークンで送った複数のリクエストが一斉に401を受けても、
    /// 破棄と再認証要求の通知は1回だけ行われる。
    ///
    /// # 引数
    /// * `token_used` - 401を受けたリクエストに付与したトークン
    ///
    /// # 戻り値
    /// このリクエストでセッションを破棄した場合はtrue
    pub fn handle_unauthorized(&self, token_used: Option<&str>) -> bool {
        let Some(token_used) = token_used else {
            return false;
        };

        let mut token = self.write_token();
        if token.as_deref() != Some(token_used) {
            log::debug!("401を受信しましたが、セッションは既に破棄済みです");
            return false;
        }

        *token = None;
        drop(token);

        self.teardown_count.fetch_add(1, Ordering::SeqCst);
        self.state_tx
            .send_replace(SessionState::ReauthenticationRequired);
        log::warn!("認証エラーを受信したため、セッションを破棄しました");
        true
    }

    /// 現在のセッション状態を取得する
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// セッション状態の変化を購読する
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// 401によるセッション破棄の回数
    pub fn teardown_count(&self) -> usize {
        self.teardown_count.load(Ordering::SeqCst)
    }

    /// アクセストークン（JWT）の有効期限を取得する
    ///
    /// 署名は検証しない（サーバー側で検証される）。ペイロードの `exp` のみを読む。
    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        let token = self.access_token()?;
        decode_expiry(&token)
    }

    /// アクセストークンが期限切れかどうかを判定する
    ///
    /// 有効期限が読み取れない場合は期限切れとみなさない
    pub fn is_token_expired(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at()
            .map(|expires_at| expires_at <= now)
            .unwrap_or(false)
    }

    fn read_token(&self) -> RwLockReadGuard<'_, Option<String>> {
        self.token.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_token(&self) -> RwLockWriteGuard<'_, Option<String>> {
        self.token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// JWTのペイロードから `exp` を取り出す
fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: TokenClaims = serde_json::from_slice(&bytes).ok()?;
    Utc.timestamp_opt(claims.exp?, 0).single()
}
