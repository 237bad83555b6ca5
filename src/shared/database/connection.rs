use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::Path;

/// データベース接続を初期化し、スキーマを作成する
///
/// # 引数
/// * `database_path` - データベースファイルのパス
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. データベース接続の開設
/// 2. 外部キー制約の有効化
/// 3. テーブルとインデックスの作成
pub fn initialize_database(database_path: &Path) -> AppResult<Connection> {
    let conn = Connection::open(database_path)?;

    configure_connection(&conn)?;
    create_tables(&conn)?;

    log::info!("データベースを初期化しました: {database_path:?}");

    Ok(conn)
}

/// テスト・オフライン検証用のインメモリデータベースを作成する
pub fn create_in_memory_connection() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_connection(&conn)?;
    create_tables(&conn)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> AppResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

/// データベーステーブルを作成する
///
/// 何度呼び出しても同じ結果になる（起動時に毎回実行される）
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    create_subscriptions_table(conn)?;
    create_recommendations_table(conn)?;
    create_negotiations_table(conn)?;
    create_activities_table(conn)?;

    Ok(())
}

/// サブスクリプションテーブルを作成する
fn create_subscriptions_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            service_name TEXT NOT NULL,
            service_category TEXT NOT NULL DEFAULT 'other',
            plan_name TEXT NOT NULL DEFAULT '',
            monthly_cost REAL NOT NULL CHECK(monthly_cost >= 0),
            billing_cycle TEXT NOT NULL CHECK(billing_cycle IN ('weekly', 'monthly', 'quarterly', 'yearly')),
            status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'cancelled', 'paused', 'trial')),
            detection_source TEXT NOT NULL DEFAULT 'manual',
            last_used_date TEXT,
            next_billing_date TEXT,
            confidence_score REAL NOT NULL DEFAULT 1.0,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_status ON subscriptions(status)",
        [],
    )?;

    Ok(())
}

/// レコメンデーションテーブルを作成する
fn create_recommendations_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS recommendations (
            id TEXT PRIMARY KEY,
            subscription_id TEXT NOT NULL REFERENCES subscriptions(id),
            action_type TEXT NOT NULL,
            current_plan TEXT NOT NULL DEFAULT '',
            recommended_plan TEXT,
            current_cost REAL NOT NULL,
            new_cost REAL,
            monthly_savings REAL NOT NULL,
            confidence_score REAL NOT NULL,
            reasoning TEXT NOT NULL DEFAULT '',
            steps_required TEXT NOT NULL DEFAULT '[]',
            executed INTEGER NOT NULL DEFAULT 0,
            execution_date TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_recommendations_subscription ON recommendations(subscription_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_recommendations_executed ON recommendations(executed)",
        [],
    )?;

    Ok(())
}

/// 交渉テーブルを作成する
///
/// メッセージ履歴と最終オファーはJSONとして1カラムに保存し、丸ごと置き換える
fn create_negotiations_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS negotiations (
            id TEXT PRIMARY KEY,
            optimization_id TEXT,
            subscription_id TEXT NOT NULL,
            provider_name TEXT NOT NULL,
            current_plan TEXT NOT NULL DEFAULT '',
            proposed_savings REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'accepted', 'rejected', 'expired')),
            messages TEXT NOT NULL DEFAULT '[]',
            final_offer TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            expires_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_negotiations_subscription ON negotiations(subscription_id)",
        [],
    )?;

    Ok(())
}

/// アクティビティテーブルを作成する
fn create_activities_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS activities (
            id TEXT PRIMARY KEY,
            activity_type TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            meta_data TEXT,
            created_at TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_created_at ON activities(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_read ON activities(read)",
        [],
    )?;

    Ok(())
}

/// データベースのバックアップを作成する
///
/// # 引数
/// * `conn` - バックアップ元のデータベース接続
/// * `backup_path` - バックアップ先ファイルのパス
pub fn backup_database(conn: &Connection, backup_path: &Path) -> AppResult<()> {
    let mut dest = Connection::open(backup_path)?;
    let backup = rusqlite::backup::Backup::new(conn, &mut dest)?;
    backup
        .run_to_completion(64, std::time::Duration::from_millis(10), None)
        .map_err(|e| AppError::Database(format!("バックアップに失敗しました: {e}")))?;

    log::info!("データベースのバックアップを作成しました: {backup_path:?}");
    Ok(())
}
