use crate::shared::errors::{AppError, AppResult};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// 環境変数取得エラー
#[derive(Debug, Clone)]
pub struct EnvVarError {
    /// 変数名
    pub var_name: String,
    /// エラーメッセージ
    pub message: String,
}

impl std::fmt::Display for EnvVarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "環境変数 {} が見つかりません: {}",
            self.var_name, self.message
        )
    }
}

impl std::error::Error for EnvVarError {}

/// 環境変数を取得する（優先順位: 起動時 > コンパイル時 > エラー）
///
/// # 引数
/// * `var_name` - 環境変数名（文字列リテラル）
///
/// # 戻り値
/// 環境変数の値、または見つからない場合はエラー
#[macro_export]
macro_rules! get_env_var {
    ($var_name:expr) => {{
        // 1. 起動時の環境変数を確認
        if let Ok(value) = std::env::var($var_name) {
            log::debug!("環境変数 {} を起動時の環境変数から取得しました", $var_name);
            Ok(value)
        }
        // 2. コンパイル時の環境変数を確認
        else if let Some(value) = option_env!($var_name) {
            log::debug!("環境変数 {} をコンパイル時の環境変数から取得しました", $var_name);
            Ok(value.to_string())
        }
        // 3. どちらも見つからない場合はエラー
        else {
            Err($crate::shared::config::environment::EnvVarError {
                var_name: $var_name.to_string(),
                message: format!(
                    "起動時の環境変数 {} もコンパイル時の環境変数も見つかりませんでした",
                    $var_name
                ),
            })
        }
    }};
}

/// 環境変数を取得する（オプション版）
#[macro_export]
macro_rules! get_env_var_optional {
    ($var_name:expr) => {{
        $crate::get_env_var!($var_name).ok()
    }};
}

/// 環境変数を取得する（デフォルト値付き）
///
/// # 引数
/// * `var_name` - 環境変数名
/// * `default_value` - デフォルト値
#[macro_export]
macro_rules! get_env_var_or_default {
    ($var_name:expr, $default_value:expr) => {{
        $crate::get_env_var!($var_name).unwrap_or_else(|_| {
            log::debug!(
                "環境変数 {} が見つからないため、デフォルト値を使用します: {}",
                $var_name,
                $default_value
            );
            $default_value.to_string()
        })
    }};
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: String,
    /// デバッグモードの有効/無効
    pub debug_mode: bool,
    /// ログレベル
    pub log_level: String,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Self {
        let environment = get_environment();
        let debug_mode = environment == Environment::Development;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        Self {
            environment: format!("{environment:?}").to_lowercase(),
            debug_mode,
            log_level,
        }
    }

    /// プロダクション環境かどうかを判定
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 開発環境かどうかを判定
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// 設定文字列からログレベルを決定する
    ///
    /// 不明な値は info として扱う
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.log_level.to_lowercase().as_str() {
            "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "info" => log::LevelFilter::Info,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. 実行時環境変数 ENVIRONMENT を確認
/// 2. デバッグビルドの場合は Development
/// 3. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = match env_var.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    let env = if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    };
    log::debug!(
        "環境判定: ビルド設定を使用 -> debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # ファイル名の規則
/// - 開発環境: "dev_subguard.db"
/// - プロダクション環境: "subguard.db"
pub fn get_database_filename(env: Environment) -> &'static str {
    match env {
        Environment::Development => "dev_subguard.db",
        Environment::Production => "subguard.db",
    }
}

/// 環境変数の読み込みを確認する
///
/// 開発ビルドの場合のみ .env ファイルを読み込む。
/// 本番環境では環境変数が実行時に設定されていることを前提とする。
pub fn load_environment_variables() {
    if cfg!(debug_assertions) {
        match dotenv::dotenv() {
            Ok(path) => {
                eprintln!("環境ファイルを読み込みました: {}", path.display());
            }
            Err(e) => {
                eprintln!("環境ファイルの読み込みに失敗: {e}");
                eprintln!("環境変数が設定されていることを確認してください");
            }
        }
    } else {
        eprintln!("本番環境: 環境変数は実行時に設定されます");
    }
}

/// ログシステムを初期化する
///
/// # 処理内容
/// 1. 環境設定を取得
/// 2. ログレベルを設定
/// 3. env_loggerを初期化（二重初期化は無視する）
pub fn initialize_logging_system() {
    let env_config = EnvironmentConfig::from_env();

    let initialized = env_logger::Builder::from_default_env()
        .filter_level(env_config.level_filter())
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .is_ok();

    if initialized {
        log::info!(
            "ログシステムを初期化しました: level={}, environment={}",
            env_config.log_level,
            env_config.environment
        );
    }
}

/// API設定を管理する構造体
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// APIサーバーのベースURL
    pub base_url: String,
    /// APIリクエストのタイムアウト（秒）
    pub timeout_seconds: u64,
    /// 読み取りリクエストの最大リトライ回数
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_seconds: 10,
            max_retries: 3,
        }
    }
}

impl ApiConfig {
    /// 環境変数からAPI設定を読み込む
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = crate::get_env_var!("API_SERVER_URL").unwrap_or_else(|_| {
            log::warn!(
                "API_SERVER_URLが設定されていません。デフォルト値を使用します: {}",
                defaults.base_url
            );
            defaults.base_url.clone()
        });

        let timeout_seconds = crate::get_env_var_or_default!("API_TIMEOUT_SECONDS", "10")
            .parse()
            .unwrap_or_else(|_| {
                log::warn!(
                    "API_TIMEOUT_SECONDSのパースに失敗しました。デフォルト値10秒を使用します"
                );
                defaults.timeout_seconds
            });

        let max_retries = crate::get_env_var_or_default!("API_MAX_RETRIES", "3")
            .parse()
            .unwrap_or_else(|_| {
                log::warn!("API_MAX_RETRIESのパースに失敗しました。デフォルト値3回を使用します");
                defaults.max_retries
            });

        log::info!(
            "API設定: base_url={base_url}, timeout={timeout_seconds}s, max_retries={max_retries}"
        );

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_seconds,
            max_retries,
        }
    }

    /// 設定を検証する
    ///
    /// # 戻り値
    /// 設定が有効な場合はOk(())、無効な場合はErr
    pub fn validate(&self) -> AppResult<()> {
        if self.base_url.is_empty() {
            return Err(AppError::configuration(
                "APIサーバーのベースURLが設定されていません",
            ));
        }

        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            AppError::configuration(format!("APIサーバーのURLが不正です: {e}"))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AppError::configuration(format!(
                "サポートされていないURLスキームです: {}",
                parsed.scheme()
            )));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::configuration(
                "APIタイムアウトは0より大きい値である必要があります",
            ));
        }

        Ok(())
    }

    /// APIサーバーがlocalhostかどうかを判定
    pub fn is_localhost(&self) -> bool {
        self.base_url.contains("localhost") || self.base_url.contains("127.0.0.1")
    }
}

/// アプリケーション設定（ローカルストア・レポート・ポーリング）
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// データベースファイルのパス（未指定の場合はデータディレクトリ配下）
    pub database_path: Option<PathBuf>,
    /// 月次レポートの月境界に使うタイムゾーン
    pub timezone: Tz,
    /// 未読件数ポーリングの間隔
    pub unread_poll_interval: Duration,
    /// 交渉の有効期間（日）
    pub negotiation_ttl_days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            timezone: chrono_tz::America::Sao_Paulo,
            unread_poll_interval: Duration::from_secs(30),
            negotiation_ttl_days: 7,
        }
    }
}

impl AppConfig {
    /// 環境変数からアプリケーション設定を読み込む
    ///
    /// # 戻り値
    /// アプリケーション設定、またはタイムゾーン名が不正な場合はエラー
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();

        let database_path = crate::get_env_var_optional!("DATABASE_PATH").map(PathBuf::from);

        let timezone = match crate::get_env_var_optional!("APP_TIMEZONE") {
            Some(name) => name.parse::<Tz>().map_err(|e| {
                AppError::configuration(format!("APP_TIMEZONEが不正です: {name} ({e})"))
            })?,
            None => defaults.timezone,
        };

        let poll_seconds: u64 =
            crate::get_env_var_or_default!("UNREAD_POLL_INTERVAL_SECONDS", "30")
                .parse()
                .unwrap_or_else(|_| {
                    log::warn!(
                        "UNREAD_POLL_INTERVAL_SECONDSのパースに失敗しました。デフォルト値30秒を使用します"
                    );
                    30
                });

        let negotiation_ttl_days = crate::get_env_var_or_default!("NEGOTIATION_TTL_DAYS", "7")
            .parse()
            .unwrap_or_else(|_| {
                log::warn!("NEGOTIATION_TTL_DAYSのパースに失敗しました。デフォルト値7日を使用します");
                defaults.negotiation_ttl_days
            });

        if poll_seconds == 0 {
            return Err(AppError::configuration(
                "UNREAD_POLL_INTERVAL_SECONDSは0より大きい値である必要があります",
            ));
        }

        Ok(Self {
            database_path,
            timezone,
            unread_poll_interval: Duration::from_secs(poll_seconds),
            negotiation_ttl_days,
        })
    }
}
