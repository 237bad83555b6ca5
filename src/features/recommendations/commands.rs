use super::analyzer;
use super::models::{ActionType, ExecutionResult, NewRecommendation, OptimizationResults, Recommendation};
use super::presenter;
use super::repository;
use crate::features::activities::models::{ActivityType, NewActivity};
use crate::features::activities::repository as activity_repository;
use crate::features::negotiations::commands::open_negotiation;
use crate::features::negotiations::models::NewNegotiation;
use crate::features::subscriptions::models::{Subscription, SubscriptionStatus};
use crate::features::subscriptions::repository as subscription_repository;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{percentage_of, round_currency, validate_score};
use crate::AppState;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;

/// 処理中レジストリでのレコメンデーションの種別名
const IN_FLIGHT_KIND: &str = "recommendation";

/// 推薦エンジンの出力を登録する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `new` - 登録内容
///
/// # 戻り値
/// 登録されたレコメンデーション、または失敗時はエラー
pub fn record_recommendation(state: &AppState, new: NewRecommendation) -> AppResult<Recommendation> {
    validate_new_recommendation(&new)?;

    let db = state.lock_db()?;
    let subscription = subscription_repository::find_by_id(&db, &new.subscription_id)?;
    let created = repository::insert(&db, &new, &subscription, Utc::now())?;

    log::info!(
        "レコメンデーションを登録しました: id={}, action={}, savings={}",
        created.id,
        created.action_type,
        created.monthly_savings
    );
    Ok(created)
}

/// サブスクリプションをローカルで分析し、結果をレコメンデーションとして登録する
///
/// 分析結果と ai_analysis のアクティビティは同じトランザクションで保存する
pub fn analyze_subscription(state: &AppState, subscription_id: &str) -> AppResult<Recommendation> {
    let mut db = state.lock_db()?;
    let tx = db.transaction()?;
    let now = Utc::now();

    let subscription = subscription_repository::find_by_id(&tx, subscription_id)?;
    let analysis = analyzer::analyze(&subscription);
    let new = NewRecommendation::from_analysis(&subscription.id, &analysis);
    validate_new_recommendation(&new)?;

    let created = repository::insert(&tx, &new, &subscription, now)?;
    activity_repository::insert(
        &tx,
        &NewActivity::new(
            ActivityType::AiAnalysis,
            format!("{}を分析しました", subscription.service_name),
        )
        .with_meta_data(json!({
            "subscription_id": subscription.id,
            "recommendation_id": created.id,
            "action_type": created.action_type.as_str(),
            "monthly_savings": created.monthly_savings,
        })),
        now,
    )?;
    tx.commit()?;

    log::info!(
        "サブスクリプションを分析しました: id={subscription_id}, action={}",
        created.action_type
    );
    Ok(created)
}

/// 未実行のレコメンデーションを表示順で取得する
///
/// # 引数
/// * `subscription_id` - 指定した場合はそのサブスクリプションのみ
pub fn get_recommendations(
    state: &AppState,
    subscription_id: Option<&str>,
) -> AppResult<Vec<Recommendation>> {
    let db = state.lock_db()?;
    let pending = repository::find_pending(&db, subscription_id)?;
    Ok(presenter::rank(pending))
}

/// レコメンデーションを実行する
///
/// 実行済みフラグ、サブスクリプションの変更、交渉の作成、アクティビティの追加を
/// 1つのトランザクションで行う。同じIDの実行が処理中の場合はInFlightエラー。
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `id` - レコメンデーションID
///
/// # 戻り値
/// 実行結果、または失敗時はエラー
pub fn execute_recommendation(state: &AppState, id: &str) -> AppResult<ExecutionResult> {
    let _guard = state.in_flight.try_acquire(IN_FLIGHT_KIND, id)?;

    let mut db = state.lock_db()?;
    let tx = db.transaction()?;
    let now = Utc::now();

    let recommendation = repository::find_by_id(&tx, id)?;
    if recommendation.executed {
        log::warn!("実行済みのレコメンデーションの再実行を拒否しました: id={id}");
        return Err(AppError::already_executed(format!(
            "ID {id} のレコメンデーションは既に実行されています"
        )));
    }

    if !repository::mark_executed(&tx, id, now)? {
        return Err(AppError::already_executed(format!(
            "ID {id} のレコメンデーションは既に実行されています"
        )));
    }

    let subscription = subscription_repository::find_by_id(&tx, &recommendation.subscription_id)?;
    let mut result = apply_action(state, &tx, &recommendation, &subscription)?;

    activity_repository::insert(
        &tx,
        &NewActivity::new(
            ActivityType::RecommendationApplied,
            format!(
                "{}のレコメンデーション（{}）を実行しました",
                subscription.service_name,
                presenter::display_action(recommendation.action_type).label
            ),
        )
        .with_meta_data(json!({
            "recommendation_id": recommendation.id,
            "subscription_id": subscription.id,
            "action_type": recommendation.action_type.as_str(),
            "monthly_savings": recommendation.monthly_savings,
            "negotiation_id": result.negotiation_id,
        })),
        now,
    )?;
    tx.commit()?;

    result.next_steps = recommendation.steps_required;
    log::info!(
        "レコメンデーションを実行しました: id={id}, action={}",
        recommendation.action_type
    );
    Ok(result)
}

/// アクション種別ごとのサブスクリプションへの反映
fn apply_action(
    state: &AppState,
    conn: &Connection,
    recommendation: &Recommendation,
    subscription: &Subscription,
) -> AppResult<ExecutionResult> {
    let now = Utc::now();

    let result = match recommendation.action_type {
        ActionType::Cancel => {
            subscription_repository::set_status(conn, &subscription.id, SubscriptionStatus::Cancelled, now)?;
            executed(
                format!("{}を解約しました", subscription.service_name),
                Some(recommendation.monthly_savings),
            )
        }
        ActionType::Downgrade | ActionType::Switch => {
            let new_monthly = recommendation
                .new_cost
                .unwrap_or(recommendation.current_cost - recommendation.monthly_savings)
                .max(0.0);
            let plan = recommendation
                .recommended_plan
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty());

            subscription_repository::set_plan_and_cost(
                conn,
                &subscription.id,
                plan,
                subscription.billing_cycle.from_monthly(new_monthly),
                now,
            )?;
            executed(
                format!("{}のプランを変更しました", subscription.service_name),
                Some(recommendation.monthly_savings),
            )
        }
        ActionType::Negotiate => {
            let negotiation = open_negotiation(
                conn,
                state.responder.as_ref(),
                &NewNegotiation {
                    optimization_id: Some(recommendation.id.clone()),
                    subscription_id: subscription.id.clone(),
                    provider_name: subscription.service_name.clone(),
                    current_plan: subscription.plan_name.clone(),
                    proposed_savings: recommendation.monthly_savings,
                },
                now,
                state.config.negotiation_ttl_days,
            )?;

            let mut result = executed(
                format!("{}との交渉を開始しました", subscription.service_name),
                None,
            );
            result.negotiation_id = Some(negotiation.id);
            result
        }
        ActionType::Keep | ActionType::Bundle | ActionType::Other => executed(
            format!("{}のレコメンデーションを適用しました", subscription.service_name),
            None,
        ),
    };

    Ok(result)
}

fn executed(message: String, savings_achieved: Option<f64>) -> ExecutionResult {
    ExecutionResult {
        success: true,
        message,
        savings_achieved,
        next_steps: Vec::new(),
        negotiation_id: None,
    }
}

/// 最適化の実績を集計する
pub fn get_optimization_results(state: &AppState) -> AppResult<OptimizationResults> {
    let db = state.lock_db()?;
    let all = repository::find_all(&db)?;
    Ok(summarize_results(&all))
}

/// レコメンデーション一覧から実績を集計する
pub fn summarize_results(recommendations: &[Recommendation]) -> OptimizationResults {
    let total = recommendations.len() as u64;
    let executed: Vec<&Recommendation> = recommendations.iter().filter(|r| r.executed).collect();

    let monthly_savings = round_currency(
        executed
            .iter()
            .map(|r| r.monthly_savings)
            .filter(|s| *s > 0.0)
            .sum(),
    );

    OptimizationResults {
        total_optimizations: total,
        executed_optimizations: executed.len() as u64,
        monthly_savings,
        yearly_savings: round_currency(monthly_savings * 12.0),
        success_rate: round_currency(percentage_of(executed.len() as f64, total as f64)),
    }
}

fn validate_new_recommendation(new: &NewRecommendation) -> AppResult<()> {
    validate_score(new.confidence_score, "信頼度")?;

    if !new.monthly_savings.is_finite() {
        return Err(AppError::validation("節約額が無効な数値です"));
    }

    if let Some(cost) = new.new_cost {
        if !cost.is_finite() || cost < 0.0 {
            return Err(AppError::validation("変更後の料金は0以上の数値である必要があります"));
        }
    }

    Ok(())
}
