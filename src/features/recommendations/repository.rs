use super::models::{NewRecommendation, Recommendation};
use crate::features::subscriptions::models::Subscription;
use crate::shared::database::row::{get_datetime, get_enum, get_json, get_optional_datetime, to_db_timestamp};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::ids::generate_entity_id;
use crate::shared::utils::round_currency;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const SELECT_COLUMNS: &str = "SELECT id, subscription_id, action_type, current_plan, recommended_plan, current_cost,
        new_cost, monthly_savings, confidence_score, reasoning, steps_required, executed, execution_date, created_at
     FROM recommendations";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Recommendation> {
    Ok(Recommendation {
        id: row.get(0)?,
        subscription_id: row.get(1)?,
        action_type: get_enum(row, 2)?,
        current_plan: row.get(3)?,
        recommended_plan: row.get(4)?,
        current_cost: row.get(5)?,
        new_cost: row.get(6)?,
        monthly_savings: row.get(7)?,
        confidence_score: row.get(8)?,
        reasoning: row.get(9)?,
        steps_required: get_json(row, 10)?,
        executed: row.get::<_, i64>(11)? != 0,
        execution_date: get_optional_datetime(row, 12)?,
        created_at: get_datetime(row, 13)?,
    })
}

/// レコメンデーションを登録する
///
/// 現在のプランと料金は対象サブスクリプションから記録する
///
/// # 引数
/// * `conn` - データベース接続
/// * `new` - 登録内容（検証済み）
/// * `subscription` - 対象のサブスクリプション
/// * `now` - 作成日時
pub fn insert(
    conn: &Connection,
    new: &NewRecommendation,
    subscription: &Subscription,
    now: DateTime<Utc>,
) -> AppResult<Recommendation> {
    let id = generate_entity_id();
    let steps = serde_json::to_string(&new.steps_required)?;

    conn.execute(
        "INSERT INTO recommendations (id, subscription_id, action_type, current_plan, recommended_plan, current_cost,
            new_cost, monthly_savings, confidence_score, reasoning, steps_required, executed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12)",
        params![
            id,
            subscription.id,
            new.action_type.as_str(),
            subscription.plan_name,
            new.recommended_plan,
            subscription.normalized_monthly_cost(),
            new.new_cost,
            round_currency(new.monthly_savings),
            new.confidence_score,
            new.reasoning,
            steps,
            to_db_timestamp(&now),
        ],
    )?;

    find_by_id(conn, &id)
}

/// IDでレコメンデーションを取得する
pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Recommendation> {
    conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], map_row)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::NotFound(format!("ID {id} のレコメンデーションが見つかりません"))
            }
            _ => AppError::Database(e.to_string()),
        })
}

/// 未実行のレコメンデーションを取得する（並び順は作成順）
///
/// # 引数
/// * `subscription_id` - 指定した場合はそのサブスクリプションのみ
pub fn find_pending(conn: &Connection, subscription_id: Option<&str>) -> AppResult<Vec<Recommendation>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE executed = 0 AND (?1 IS NULL OR subscription_id = ?1) ORDER BY rowid"
    ))?;
    let recommendations = stmt.query_map(params![subscription_id], map_row)?;

    recommendations
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

/// すべてのレコメンデーションを取得する（実行済みを含む）
pub fn find_all(conn: &Connection) -> AppResult<Vec<Recommendation>> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid"))?;
    let recommendations = stmt.query_map([], map_row)?;

    recommendations
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

/// レコメンデーションを実行済みにする
///
/// 未実行の行だけを更新する。0行の場合は呼び出し側で状態を確認すること。
///
/// # 戻り値
/// 実行済みにできた場合はtrue
pub fn mark_executed(conn: &Connection, id: &str, now: DateTime<Utc>) -> AppResult<bool> {
    let rows_affected = conn.execute(
        "UPDATE recommendations SET executed = 1, execution_date = ?1 WHERE id = ?2 AND executed = 0",
        params![to_db_timestamp(&now), id],
    )?;

    Ok(rows_affected == 1)
}

/// サブスクリプションに紐づくレコメンデーションを削除する
///
/// # 戻り値
/// 削除した件数
pub fn delete_by_subscription(conn: &Connection, subscription_id: &str) -> AppResult<usize> {
    let rows_affected = conn.execute(
        "DELETE FROM recommendations WHERE subscription_id = ?1",
        params![subscription_id],
    )?;

    Ok(rows_affected)
}
