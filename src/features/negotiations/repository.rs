use super::models::{FinalOffer, Message, Negotiation, NegotiationStatus, NewNegotiation};
use crate::shared::database::row::{
    get_datetime, get_enum, get_json, get_optional_datetime, get_optional_json,
    to_db_optional_timestamp, to_db_timestamp,
};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::ids::generate_entity_id;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const SELECT_COLUMNS: &str = "SELECT id, optimization_id, subscription_id, provider_name, current_plan, proposed_savings,
        status, messages, final_offer, created_at, updated_at, expires_at
     FROM negotiations";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Negotiation> {
    Ok(Negotiation {
        id: row.get(0)?,
        optimization_id: row.get(1)?,
        subscription_id: row.get(2)?,
        provider_name: row.get(3)?,
        current_plan: row.get(4)?,
        proposed_savings: row.get(5)?,
        status: get_enum(row, 6)?,
        messages: get_json(row, 7)?,
        final_offer: get_optional_json(row, 8)?,
        created_at: get_datetime(row, 9)?,
        updated_at: get_datetime(row, 10)?,
        expires_at: get_optional_datetime(row, 11)?,
    })
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("ID {id} の交渉が見つかりません"))
}

/// 交渉を作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `new` - 交渉作成用DTO（検証済み）
/// * `messages` - 最初のメッセージ列
/// * `now` - 作成日時
/// * `expires_at` - 有効期限
pub fn insert(
    conn: &Connection,
    new: &NewNegotiation,
    messages: &[Message],
    now: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> AppResult<Negotiation> {
    let id = generate_entity_id();
    let now_str = to_db_timestamp(&now);

    conn.execute(
        "INSERT INTO negotiations (id, optimization_id, subscription_id, provider_name, current_plan, proposed_savings,
            status, messages, final_offer, created_at, updated_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, NULL, ?8, ?9, ?10)",
        params![
            id,
            new.optimization_id,
            new.subscription_id,
            new.provider_name.trim(),
            new.current_plan,
            new.proposed_savings,
            serde_json::to_string(messages)?,
            now_str,
            now_str,
            to_db_optional_timestamp(expires_at.as_ref()),
        ],
    )?;

    find_by_id(conn, &id)
}

/// IDで交渉を取得する
pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Negotiation> {
    conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], map_row)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => not_found(id),
            _ => AppError::Database(e.to_string()),
        })
}

/// 交渉一覧を作成順に取得する
///
/// # 引数
/// * `status` - 指定した場合は保存されている状態で絞り込む
pub fn find_all(conn: &Connection, status: Option<NegotiationStatus>) -> AppResult<Vec<Negotiation>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE (?1 IS NULL OR status = ?1) ORDER BY rowid"
    ))?;
    let negotiations = stmt.query_map(params![status.map(|s| s.as_str())], map_row)?;

    negotiations
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

/// 会話（メッセージ列と最終オファー）を丸ごと置き換える
pub fn replace_conversation(
    conn: &Connection,
    id: &str,
    messages: &[Message],
    final_offer: Option<&FinalOffer>,
    now: DateTime<Utc>,
) -> AppResult<Negotiation> {
    let final_offer = final_offer.map(serde_json::to_string).transpose()?;

    let rows_affected = conn.execute(
        "UPDATE negotiations SET messages = ?1, final_offer = ?2, updated_at = ?3 WHERE id = ?4",
        params![serde_json::to_string(messages)?, final_offer, to_db_timestamp(&now), id],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    find_by_id(conn, id)
}

/// 交渉の状態を変更する
pub fn set_status(
    conn: &Connection,
    id: &str,
    status: NegotiationStatus,
    now: DateTime<Utc>,
) -> AppResult<Negotiation> {
    let rows_affected = conn.execute(
        "UPDATE negotiations SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), to_db_timestamp(&now), id],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    find_by_id(conn, id)
}
