use super::models::{Activity, NewActivity};
use crate::shared::database::row::{get_datetime, get_enum, get_optional_json, to_db_timestamp};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::ids::generate_entity_id;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const SELECT_COLUMNS: &str =
    "SELECT id, activity_type, title, description, meta_data, created_at, read FROM activities";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        activity_type: get_enum(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        meta_data: get_optional_json(row, 4)?,
        created_at: get_datetime(row, 5)?,
        read: row.get::<_, i64>(6)? != 0,
    })
}

/// アクティビティを追加する
///
/// トランザクション内から呼び出すことで、元の変更と同時にコミットされる
///
/// # 引数
/// * `conn` - データベース接続（トランザクション可）
/// * `activity` - 追加するアクティビティ
/// * `now` - 作成日時
///
/// # 戻り値
/// 追加されたアクティビティ、または失敗時はエラー
pub fn insert(conn: &Connection, activity: &NewActivity, now: DateTime<Utc>) -> AppResult<Activity> {
    let id = generate_entity_id();
    let meta_data = activity
        .meta_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO activities (id, activity_type, title, description, meta_data, created_at, read)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![
            id,
            activity.activity_type.as_str(),
            activity.title,
            activity.description,
            meta_data,
            to_db_timestamp(&now),
        ],
    )?;

    find_by_id(conn, &id)
}

/// IDでアクティビティを取得する
pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Activity> {
    conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], map_row)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::NotFound(format!("ID {id} のアクティビティが見つかりません"))
            }
            _ => AppError::Database(e.to_string()),
        })
}

/// 新しい順にアクティビティを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `limit` - 取得件数
/// * `skip` - 読み飛ばす件数
pub fn find_recent(conn: &Connection, limit: u32, skip: u32) -> AppResult<Vec<Activity>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
    ))?;
    let activities = stmt.query_map(params![limit, skip], map_row)?;

    activities
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

/// 期間内のアクティビティを新しい順に取得する（開始を含み終了を含まない）
pub fn find_between(
    conn: &Connection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> AppResult<Vec<Activity>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE created_at >= ?1 AND created_at < ?2 ORDER BY created_at DESC, rowid DESC"
    ))?;
    let activities = stmt.query_map(
        params![to_db_timestamp(&start), to_db_timestamp(&end)],
        map_row,
    )?;

    activities
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

/// アクティビティを既読にする
///
/// 既読のアクティビティを再度既読にしても成功する
pub fn mark_read(conn: &Connection, id: &str) -> AppResult<()> {
    let rows_affected = conn.execute("UPDATE activities SET read = 1 WHERE id = ?1", params![id])?;

    if rows_affected == 0 {
        return Err(AppError::NotFound(format!(
            "ID {id} のアクティビティが見つかりません"
        )));
    }

    Ok(())
}

/// 未読件数を取得する
pub fn count_unread(conn: &Connection) -> AppResult<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM activities WHERE read = 0", [], |row| {
        row.get(0)
    })?;
    Ok(count.max(0) as u64)
}
