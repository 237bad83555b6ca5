// 機能モジュール構造
pub mod features;
pub mod shared;

use features::negotiations::responder::{ProviderResponder, ScriptedResponder};
use log::info;
use rusqlite::Connection;
use shared::config::environment::{
    initialize_logging_system, load_environment_variables, AppConfig,
};
use shared::config::initialization::{initialize_application, log_initialization_complete};
use shared::database::{create_in_memory_connection, initialize_database};
use shared::errors::{AppError, AppResult};
use shared::in_flight::InFlightRegistry;
use std::sync::{Arc, Mutex, MutexGuard};

/// アプリケーション状態（ローカルストアと実行中の操作を保持）
pub struct AppState {
    pub db: Mutex<Connection>,
    /// エンティティ単位の実行中操作
    pub in_flight: InFlightRegistry,
    /// 交渉メッセージへの返信を生成する外部協調者
    pub responder: Arc<dyn ProviderResponder>,
    pub config: AppConfig,
}

impl AppState {
    /// 既存のデータベース接続から状態を作成する
    pub fn new(db: Connection, config: AppConfig, responder: Arc<dyn ProviderResponder>) -> Self {
        Self {
            db: Mutex::new(db),
            in_flight: InFlightRegistry::new(),
            responder,
            config,
        }
    }

    /// インメモリデータベースと台本どおりの返信者で状態を作成する（オフライン検証用）
    pub fn in_memory(config: AppConfig) -> AppResult<Self> {
        let conn = create_in_memory_connection()?;
        Ok(Self::new(conn, config, Arc::new(ScriptedResponder::new())))
    }

    /// 返信者を差し替える
    pub fn with_responder(mut self, responder: Arc<dyn ProviderResponder>) -> Self {
        self.responder = responder;
        self
    }

    /// データベース接続を取得する
    pub fn lock_db(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| AppError::Database(format!("データベースロックエラー: {e}")))
    }
}

/// アプリケーションを初期化する
///
/// # 処理内容
/// 1. 環境変数の読み込み
/// 2. ログシステムの初期化
/// 3. 設定の読み込み
/// 4. データディレクトリとデータベースの初期化
///
/// # 戻り値
/// アプリケーション状態、または失敗時はエラー
pub fn initialize() -> AppResult<AppState> {
    load_environment_variables();
    initialize_logging_system();

    info!("アプリケーションを初期化しています...");

    let config = AppConfig::from_env()?;
    let init_result = initialize_application(config.database_path.as_deref())?;
    let conn = initialize_database(&init_result.database_path)?;

    log_initialization_complete(&init_result);

    Ok(AppState::new(conn, config, Arc::new(ScriptedResponder::new())))
}
