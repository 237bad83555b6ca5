use super::models::{CreateSubscriptionDto, Subscription, UpdateSubscriptionDto};
use super::repository;
use crate::features::activities::models::{ActivityType, NewActivity};
use crate::features::activities::repository as activity_repository;
use crate::features::recommendations::repository as recommendation_repository;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{
    validate_cost, validate_required_field, validate_score, validate_text_length,
};
use crate::AppState;
use chrono::Utc;
use serde_json::json;

/// サブスクリプションを作成する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `dto` - サブスクリプション作成用DTO
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
pub fn create_subscription(state: &AppState, dto: CreateSubscriptionDto) -> AppResult<Subscription> {
    // バリデーション
    validate_create_subscription_dto(&dto)?;

    let mut db = state.lock_db()?;
    let tx = db.transaction()?;
    let now = Utc::now();

    let created = repository::create(&tx, &dto, now)?;
    activity_repository::insert(
        &tx,
        &NewActivity::new(
            ActivityType::SubscriptionAdded,
            format!("{}を追加しました", created.service_name),
        )
        .with_meta_data(json!({
            "subscription_id": created.id,
            "monthly_cost": created.monthly_cost,
        })),
        now,
    )?;
    tx.commit()?;

    log::info!(
        "サブスクリプションを作成しました: id={}, service={}",
        created.id,
        created.service_name
    );
    Ok(created)
}

/// サブスクリプション一覧を取得する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `active_only` - アクティブなサブスクリプションのみを取得するか
pub fn get_subscriptions(state: &AppState, active_only: bool) -> AppResult<Vec<Subscription>> {
    let db = state.lock_db()?;
    repository::find_all(&db, active_only)
}

/// IDでサブスクリプションを取得する
pub fn get_subscription(state: &AppState, id: &str) -> AppResult<Subscription> {
    let db = state.lock_db()?;
    repository::find_by_id(&db, id)
}

/// サブスクリプションを更新する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `id` - サブスクリプションID
/// * `dto` - サブスクリプション更新用DTO
///
/// # 戻り値
/// 更新されたサブスクリプション、または失敗時はエラー
pub fn update_subscription(
    state: &AppState,
    id: &str,
    dto: UpdateSubscriptionDto,
) -> AppResult<Subscription> {
    validate_update_subscription_dto(&dto)?;

    let mut db = state.lock_db()?;
    let tx = db.transaction()?;
    let now = Utc::now();

    let updated = repository::update(&tx, id, &dto, now)?;
    activity_repository::insert(
        &tx,
        &NewActivity::new(
            ActivityType::SubscriptionUpdated,
            format!("{}を更新しました", updated.service_name),
        )
        .with_meta_data(json!({ "subscription_id": updated.id })),
        now,
    )?;
    tx.commit()?;

    log::info!("サブスクリプションを更新しました: id={id}");
    Ok(updated)
}

/// サブスクリプションを削除する
///
/// レコメンデーションは既存のサブスクリプションを参照する必要があるため、
/// 実行済みのものも含めて同じトランザクションで削除する。交渉履歴は残す。
pub fn delete_subscription(state: &AppState, id: &str) -> AppResult<()> {
    let mut db = state.lock_db()?;
    let tx = db.transaction()?;
    let now = Utc::now();

    let existing = repository::find_by_id(&tx, id)?;
    let removed = recommendation_repository::delete_by_subscription(&tx, id)?;
    repository::delete(&tx, id)?;
    activity_repository::insert(
        &tx,
        &NewActivity::new(
            ActivityType::SubscriptionDeleted,
            format!("{}を削除しました", existing.service_name),
        )
        .with_meta_data(json!({
            "subscription_id": id,
            "removed_recommendations": removed,
        })),
        now,
    )?;
    tx.commit()?;

    log::info!("サブスクリプションを削除しました: id={id}, removed_recommendations={removed}");
    Ok(())
}

/// アクティブなサブスクリプションの月額合計を取得する
pub fn get_monthly_subscription_total(state: &AppState) -> AppResult<f64> {
    let db = state.lock_db()?;
    repository::calculate_monthly_total(&db)
}

fn validate_service_name(name: &str) -> AppResult<()> {
    validate_required_field(name, "サービス名")?;
    validate_text_length(name.trim(), 100, "サービス名")
}

/// サブスクリプション作成DTOのバリデーション
fn validate_create_subscription_dto(dto: &CreateSubscriptionDto) -> AppResult<()> {
    validate_service_name(&dto.service_name)?;
    validate_text_length(&dto.plan_name, 100, "プラン名")?;
    validate_cost(dto.monthly_cost, "料金")?;

    if let Some(score) = dto.confidence_score {
        validate_score(score, "信頼度")?;
    }

    Ok(())
}

/// サブスクリプション更新DTOのバリデーション
fn validate_update_subscription_dto(dto: &UpdateSubscriptionDto) -> AppResult<()> {
    if dto.is_empty() {
        return Err(AppError::validation("更新する項目を指定してください"));
    }

    if let Some(ref name) = dto.service_name {
        validate_service_name(name)?;
    }

    if let Some(ref plan_name) = dto.plan_name {
        validate_text_length(plan_name, 100, "プラン名")?;
    }

    if let Some(cost) = dto.monthly_cost {
        validate_cost(cost, "料金")?;
    }

    if let Some(score) = dto.confidence_score {
        validate_score(score, "信頼度")?;
    }

    Ok(())
}
