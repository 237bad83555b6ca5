use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// バリデーション関連のエラー（入力の形式・範囲が不正）
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// リソースが見つからない場合のエラー
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 現在の状態では実行できない操作
    #[error("状態エラー: {0}")]
    InvalidState(String),

    /// 実行済みのレコメンデーションを再実行しようとした
    #[error("実行済みエラー: {0}")]
    AlreadyExecuted(String),

    /// 前提条件を満たしていない（最終オファーなしでの承諾など）
    #[error("前提条件エラー: {0}")]
    Precondition(String),

    /// 同じエンティティに対する変更操作が処理中
    #[error("処理中エラー: {0}")]
    InFlight(String),

    /// ビューの破棄などで処理がキャンセルされた
    #[error("キャンセルされました: {0}")]
    Cancelled(String),

    /// 認証エラー（APIサーバーからの401）
    #[error("認証エラー: {0}")]
    Auth(String),

    /// 通信エラー（接続失敗・タイムアウト）
    #[error("通信エラー: {0}")]
    Network(String),

    /// 外部サービス連携でのエラー
    #[error("外部サービスエラー: {0}")]
    ExternalService(String),

    /// データベース関連のエラー
    #[error("データベースエラー: {0}")]
    Database(String),

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// I/O関連のエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    /// JSON解析エラー
    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),
}

/// エラーの重要度を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    /// 低重要度（ユーザー入力エラーなど）
    Low,
    /// 中重要度（外部サービス一時的エラーなど）
    Medium,
    /// 高重要度（データベースエラーなど）
    High,
    /// 最重要（認証エラーなど）
    Critical,
}

impl AppError {
    /// ユーザーに表示するためのフレンドリーなメッセージを取得
    ///
    /// # 戻り値
    /// ユーザーに表示可能なエラーメッセージ
    pub fn user_message(&self) -> &str {
        match self {
            AppError::Validation(msg) => msg,
            AppError::NotFound(msg) => msg,
            AppError::InvalidState(msg) => msg,
            AppError::AlreadyExecuted(_) => "このおすすめはすでに実行されています",
            AppError::Precondition(msg) => msg,
            AppError::InFlight(_) => "処理中です。完了までお待ちください",
            AppError::Cancelled(_) => "処理がキャンセルされました",
            AppError::Auth(_) => "認証に失敗しました。再度ログインしてください",
            AppError::Network(_) => "APIサーバーとの通信に失敗しました",
            AppError::ExternalService(_) => "外部サービスとの通信でエラーが発生しました",
            AppError::Database(_) => "データベース操作でエラーが発生しました",
            AppError::Configuration(_) => "設定エラーが発生しました",
            AppError::Io(_) => "ファイル操作でエラーが発生しました",
            AppError::Json(_) => "データ形式の解析でエラーが発生しました",
        }
    }

    /// エラーの詳細情報を取得
    ///
    /// # 戻り値
    /// エラーの詳細情報（ログ出力用）
    pub fn details(&self) -> String {
        format!("{self}")
    }

    /// エラーの重要度を取得
    ///
    /// # 戻り値
    /// エラーの重要度レベル
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::Validation(_)
            | AppError::NotFound(_)
            | AppError::InvalidState(_)
            | AppError::AlreadyExecuted(_)
            | AppError::Precondition(_)
            | AppError::InFlight(_)
            | AppError::Cancelled(_) => ErrorSeverity::Low,
            AppError::Network(_) | AppError::ExternalService(_) => ErrorSeverity::Medium,
            AppError::Io(_) | AppError::Json(_) => ErrorSeverity::Medium,
            AppError::Database(_) | AppError::Configuration(_) => ErrorSeverity::High,
            AppError::Auth(_) => ErrorSeverity::Critical,
        }
    }

    /// 自動リトライしてよいエラーかどうか
    ///
    /// 通信エラーのみが対象。リトライするかどうかは呼び出し側が
    /// 冪等な読み取りかどうかで判断する。
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Network(_))
    }

    /// バリデーションエラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `message` - バリデーションエラーメッセージ
    ///
    /// # 戻り値
    /// バリデーションエラー
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// リソース未発見エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `resource` - 見つからなかったリソース名
    ///
    /// # 戻り値
    /// リソース未発見エラー
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AppError::NotFound(format!("{}が見つかりません", resource.into()))
    }

    /// 状態エラーを作成するヘルパー関数
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        AppError::InvalidState(message.into())
    }

    /// 実行済みエラーを作成するヘルパー関数
    pub fn already_executed<S: Into<String>>(message: S) -> Self {
        AppError::AlreadyExecuted(message.into())
    }

    /// 前提条件エラーを作成するヘルパー関数
    pub fn precondition<S: Into<String>>(message: S) -> Self {
        AppError::Precondition(message.into())
    }

    /// 処理中エラーを作成するヘルパー関数
    pub fn in_flight<S: Into<String>>(message: S) -> Self {
        AppError::InFlight(message.into())
    }

    /// 外部サービスエラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `service` - サービス名
    /// * `message` - エラーメッセージ
    ///
    /// # 戻り値
    /// 外部サービスエラー
    pub fn external_service<S: Into<String>>(service: S, message: S) -> Self {
        AppError::ExternalService(format!("{}: {}", service.into(), message.into()))
    }

    /// 設定エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `message` - 設定エラーメッセージ
    ///
    /// # 戻り値
    /// 設定エラー
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }
}

/// AppErrorからStringへの変換（画面表示用）
impl From<AppError> for String {
    fn from(error: AppError) -> Self {
        error.user_message().to_string()
    }
}

/// rusqlite::ErrorからAppErrorへの変換
impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        AppError::Database(error.to_string())
    }
}

/// reqwest::ErrorからAppErrorへの変換
///
/// 接続失敗・タイムアウトは通信エラー、それ以外は外部サービスエラーとして扱う
impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() {
            AppError::Network(error.to_string())
        } else if error.is_decode() {
            AppError::ExternalService(format!("レスポンス解析エラー: {error}"))
        } else {
            AppError::ExternalService(error.to_string())
        }
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;
