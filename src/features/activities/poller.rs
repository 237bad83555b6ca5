use super::repository;
use crate::shared::errors::AppResult;
use crate::AppState;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// 未読件数の取得元
pub trait UnreadCountSource: Send + Sync + 'static {
    fn unread_count(&self) -> BoxFuture<'_, AppResult<u64>>;
}

/// ローカルストアから未読件数を取得する
pub struct LocalUnreadCount {
    state: Arc<AppState>,
}

impl LocalUnreadCount {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl UnreadCountSource for LocalUnreadCount {
    fn unread_count(&self) -> BoxFuture<'_, AppResult<u64>> {
        // ロックはawaitをまたがないよう同期的に取得して解放する
        let result = self
            .state
            .lock_db()
            .and_then(|db| repository::count_unread(&db));
        Box::pin(futures::future::ready(result))
    }
}

/// 未読件数の定期ポーリング
///
/// 取得に失敗しても停止せず、次の周期で再取得する。
/// 画面の破棄時は `stop()` で明示的に停止する（ドロップでも停止する）。
pub struct UnreadCountPoller {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    count_rx: watch::Receiver<Option<u64>>,
}

impl UnreadCountPoller {
    /// ポーリングを開始する
    ///
    /// 最初の取得は開始直後に行われる。tokioランタイム内から呼び出すこと。
    ///
    /// # 引数
    /// * `source` - 未読件数の取得元
    /// * `interval` - ポーリング間隔
    pub fn start(source: Arc<dyn UnreadCountSource>, interval: Duration) -> Self {
        Self::start_with_token(source, interval, CancellationToken::new())
    }

    /// 親のキャンセルトークンに連動するポーリングを開始する
    pub fn start_with_token(
        source: Arc<dyn UnreadCountSource>,
        interval: Duration,
        parent: CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let (count_tx, count_rx) = watch::channel(None);

        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            log::debug!("未読件数のポーリングを開始しました: interval={interval:?}");

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    _ = task_token.cancelled() => break,
                    result = source.unread_count() => result,
                };

                match result {
                    Ok(count) => {
                        count_tx.send_replace(Some(count));
                    }
                    Err(e) => {
                        log::warn!("未読件数の取得に失敗しました（次の周期で再試行します）: {e}");
                    }
                }
            }

            log::debug!("未読件数のポーリングを停止しました");
        });

        Self {
            token,
            handle: Some(handle),
            count_rx,
        }
    }

    /// 最新の未読件数（未取得の場合はNone）
    pub fn latest(&self) -> Option<u64> {
        *self.count_rx.borrow()
    }

    /// 未読件数の変化を購読する
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.count_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// ポーリングを停止し、タスクの終了を待つ
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::error!("ポーリングタスクが異常終了しました: {e}");
            }
        }
    }
}

impl Drop for UnreadCountPoller {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
