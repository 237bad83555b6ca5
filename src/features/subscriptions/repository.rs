use super::models::{
    CreateSubscriptionDto, Subscription, SubscriptionStatus, UpdateSubscriptionDto,
};
use crate::shared::database::row::{
    get_datetime, get_enum, get_optional_datetime, to_db_optional_timestamp, to_db_timestamp,
};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::ids::generate_entity_id;
use crate::shared::utils::round_currency;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const SELECT_COLUMNS: &str = "SELECT id, service_name, service_category, plan_name, monthly_cost, billing_cycle, status,
        detection_source, last_used_date, next_billing_date, confidence_score, notes, created_at, updated_at
     FROM subscriptions";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        service_name: row.get(1)?,
        service_category: row.get(2)?,
        plan_name: row.get(3)?,
        monthly_cost: row.get(4)?,
        billing_cycle: get_enum(row, 5)?,
        status: get_enum(row, 6)?,
        detection_source: Some(get_enum(row, 7)?),
        last_used_date: get_optional_datetime(row, 8)?,
        next_billing_date: get_optional_datetime(row, 9)?,
        confidence_score: row.get(10)?,
        notes: row.get(11)?,
        created_at: get_datetime(row, 12)?,
        updated_at: get_datetime(row, 13)?,
    })
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("ID {id} のサブスクリプションが見つかりません"))
}

/// サブスクリプションを作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `dto` - サブスクリプション作成用DTO（検証済み）
/// * `now` - 作成日時
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
pub fn create(
    conn: &Connection,
    dto: &CreateSubscriptionDto,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    let id = generate_entity_id();
    let now_str = to_db_timestamp(&now);

    conn.execute(
        "INSERT INTO subscriptions (id, service_name, service_category, plan_name, monthly_cost, billing_cycle,
            status, detection_source, last_used_date, next_billing_date, confidence_score, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            id,
            dto.service_name.trim(),
            dto.service_category.trim(),
            dto.plan_name.trim(),
            dto.monthly_cost,
            dto.billing_cycle.as_str(),
            dto.status.unwrap_or_default().as_str(),
            dto.detection_source.unwrap_or_default().as_str(),
            to_db_optional_timestamp(dto.last_used_date.as_ref()),
            to_db_optional_timestamp(dto.next_billing_date.as_ref()),
            dto.confidence_score.unwrap_or(1.0),
            dto.notes,
            now_str,
            now_str,
        ],
    )?;

    find_by_id(conn, &id)
}

/// IDでサブスクリプションを取得する
pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Subscription> {
    conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], map_row)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => not_found(id),
            _ => AppError::Database(e.to_string()),
        })
}

/// サブスクリプション一覧を作成順に取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `active_only` - アクティブなサブスクリプションのみを取得するか
pub fn find_all(conn: &Connection, active_only: bool) -> AppResult<Vec<Subscription>> {
    let query = if active_only {
        format!("{SELECT_COLUMNS} WHERE status = 'active' ORDER BY rowid")
    } else {
        format!("{SELECT_COLUMNS} ORDER BY rowid")
    };

    let mut stmt = conn.prepare(&query)?;
    let subscriptions = stmt.query_map([], map_row)?;

    subscriptions
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

/// サブスクリプションを更新する
///
/// DTOで指定された項目のみを上書きする
pub fn update(
    conn: &Connection,
    id: &str,
    dto: &UpdateSubscriptionDto,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    let existing = find_by_id(conn, id)?;

    let service_name = dto
        .service_name
        .as_deref()
        .map(str::trim)
        .unwrap_or(&existing.service_name);
    let service_category = dto
        .service_category
        .as_deref()
        .map(str::trim)
        .unwrap_or(&existing.service_category);
    let plan_name = dto
        .plan_name
        .as_deref()
        .map(str::trim)
        .unwrap_or(&existing.plan_name);
    let monthly_cost = dto.monthly_cost.unwrap_or(existing.monthly_cost);
    let billing_cycle = dto.billing_cycle.unwrap_or(existing.billing_cycle);
    let status = dto.status.unwrap_or(existing.status);
    let last_used_date = dto.last_used_date.or(existing.last_used_date);
    let next_billing_date = dto.next_billing_date.or(existing.next_billing_date);
    let confidence_score = dto.confidence_score.unwrap_or(existing.confidence_score);
    let notes = dto.notes.clone().or(existing.notes);

    conn.execute(
        "UPDATE subscriptions
         SET service_name = ?1, service_category = ?2, plan_name = ?3, monthly_cost = ?4, billing_cycle = ?5,
             status = ?6, last_used_date = ?7, next_billing_date = ?8, confidence_score = ?9, notes = ?10,
             updated_at = ?11
         WHERE id = ?12",
        params![
            service_name,
            service_category,
            plan_name,
            monthly_cost,
            billing_cycle.as_str(),
            status.as_str(),
            to_db_optional_timestamp(last_used_date.as_ref()),
            to_db_optional_timestamp(next_billing_date.as_ref()),
            confidence_score,
            notes,
            to_db_timestamp(&now),
            id,
        ],
    )?;

    find_by_id(conn, id)
}

/// サブスクリプションの状態を変更する
pub fn set_status(
    conn: &Connection,
    id: &str,
    status: SubscriptionStatus,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    let rows_affected = conn.execute(
        "UPDATE subscriptions SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), to_db_timestamp(&now), id],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    find_by_id(conn, id)
}

/// プランと料金を変更する（ダウングレード・乗り換え・交渉成立時）
///
/// # 引数
/// * `plan_name` - 新しいプラン名（Noneの場合は変更しない）
/// * `cost_per_cycle` - 新しい1サイクルあたりの料金
pub fn set_plan_and_cost(
    conn: &Connection,
    id: &str,
    plan_name: Option<&str>,
    cost_per_cycle: f64,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    let rows_affected = conn.execute(
        "UPDATE subscriptions
         SET plan_name = COALESCE(?1, plan_name), monthly_cost = ?2, updated_at = ?3
         WHERE id = ?4",
        params![plan_name, round_currency(cost_per_cycle), to_db_timestamp(&now), id],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    find_by_id(conn, id)
}

/// サブスクリプションを削除する
///
/// 関連するレコメンデーションは呼び出し側で先に削除すること
pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
    let rows_affected = conn.execute("DELETE FROM subscriptions WHERE id = ?1", params![id])?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    Ok(())
}

/// アクティブなサブスクリプションの月額合計を計算する
///
/// 各サブスクリプションの料金を月額換算して合計し、セント単位に丸める
pub fn calculate_monthly_total(conn: &Connection) -> AppResult<f64> {
    let subscriptions = find_all(conn, true)?;
    Ok(monthly_total_of(&subscriptions))
}

/// サブスクリプション一覧のうちアクティブなものの月額合計
pub fn monthly_total_of(subscriptions: &[Subscription]) -> f64 {
    let total = subscriptions
        .iter()
        .filter(|sub| sub.is_active())
        .fold(0.0, |acc, sub| acc + sub.normalized_monthly_cost());

    round_currency(total)
}
