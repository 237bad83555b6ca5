use crate::shared::errors::{AppError, AppResult};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// 画面（ビュー）の生存期間に紐づくキャンセルスコープ
///
/// スコープがキャンセル（またはドロップ）された後に完了したリクエストの結果は
/// 呼び出し側へ `AppError::Cancelled` として返り、状態には反映されない。
#[derive(Debug)]
pub struct ViewScope {
    name: String,
    token: CancellationToken,
}

impl ViewScope {
    /// 新しいスコープを作成する
    ///
    /// # 引数
    /// * `name` - ビュー名（ログ用）
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            token: CancellationToken::new(),
        }
    }

    /// 親スコープのキャンセルに連動する子スコープを作成する
    pub fn child<S: Into<String>>(&self, name: S) -> Self {
        Self {
            name: name.into(),
            token: self.token.child_token(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// スコープをキャンセルする（画面離脱時）
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            log::debug!("ビューを破棄しました: {}", self.name);
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// バックグラウンドタスクに渡すためのトークンを取得する
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// スコープ内で非同期処理を実行する
    ///
    /// # 戻り値
    /// 処理結果。キャンセル済み、または実行中にキャンセルされた場合はCancelledエラー
    pub async fn run<F, T>(&self, future: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        if self.token.is_cancelled() {
            return Err(self.cancelled_error());
        }

        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(self.cancelled_error()),
            result = future => result,
        };

        // 完了と同時にキャンセルされた場合も結果を捨てる
        if self.token.is_cancelled() {
            return Err(self.cancelled_error());
        }

        result
    }

    /// スコープが有効な場合のみ状態更新を適用する
    ///
    /// # 戻り値
    /// 適用した場合はSome、キャンセル済みの場合はNone
    pub fn apply_if_active<T>(&self, apply: impl FnOnce() -> T) -> Option<T> {
        if self.token.is_cancelled() {
            log::debug!("破棄済みのビューへの更新を破棄しました: {}", self.name);
            return None;
        }
        Some(apply())
    }

    fn cancelled_error(&self) -> AppError {
        AppError::Cancelled(self.name.clone())
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_completes_when_active() {
        let scope = ViewScope::new("negotiations");
        let result = scope.run(async { Ok::<_, AppError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_run_after_cancel_is_rejected() {
        let scope = ViewScope::new("negotiations");
        scope.cancel();

        let result = scope.run(async { Ok::<_, AppError>(1) }).await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_cancel_during_request() {
        let scope = ViewScope::new("recommendations");
        let token = scope.token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AppError>(())
            })
            .await;

        assert!(matches!(result, Err(AppError::Cancelled(_))));
    }

    #[test]
    fn test_apply_if_active() {
        let scope = ViewScope::new("dashboard");
        assert_eq!(scope.apply_if_active(|| 1), Some(1));

        scope.cancel();
        assert_eq!(scope.apply_if_active(|| 2), None);
    }

    #[test]
    fn test_child_follows_parent_and_drop_cancels() {
        let parent = ViewScope::new("app");
        let child = parent.child("negotiation-detail");
        let token = parent.token();

        assert!(!child.is_cancelled());
        drop(parent);
        assert!(token.is_cancelled());
        assert!(child.is_cancelled());
    }
}
