use super::models::{Activity, NewActivity};
use super::repository;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{validate_required_field, validate_text_length};
use crate::AppState;
use chrono::Utc;

/// 一度に取得できるアクティビティの最大件数
const MAX_ACTIVITY_LIMIT: u32 = 100;

/// 最近のアクティビティを取得する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `limit` - 取得件数（1〜100）
/// * `skip` - 読み飛ばす件数
///
/// # 戻り値
/// 新しい順のアクティビティ一覧
pub fn get_recent_activities(state: &AppState, limit: u32, skip: u32) -> AppResult<Vec<Activity>> {
    if limit == 0 || limit > MAX_ACTIVITY_LIMIT {
        return Err(AppError::validation(format!(
            "取得件数は1から{MAX_ACTIVITY_LIMIT}の範囲で指定してください"
        )));
    }

    let db = state.lock_db()?;
    repository::find_recent(&db, limit, skip)
}

/// アクティビティを記録する
pub fn record_activity(state: &AppState, activity: NewActivity) -> AppResult<Activity> {
    validate_required_field(&activity.title, "タイトル")?;
    validate_text_length(&activity.title, 200, "タイトル")?;

    let db = state.lock_db()?;
    let created = repository::insert(&db, &activity, Utc::now())?;
    log::debug!("アクティビティを記録しました: type={}", created.activity_type);
    Ok(created)
}

/// アクティビティを既読にする
pub fn mark_activity_read(state: &AppState, id: &str) -> AppResult<()> {
    let db = state.lock_db()?;
    repository::mark_read(&db, id)
}

/// 未読件数を取得する
pub fn get_unread_count(state: &AppState) -> AppResult<u64> {
    let db = state.lock_db()?;
    repository::count_unread(&db)
}
