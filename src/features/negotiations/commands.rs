use super::models::{Message, Negotiation, NegotiationStatus, NewNegotiation};
use super::repository;
use super::responder::{ProviderResponder, ResponderRequest};
use super::state::{self as negotiation_state, NegotiationEvent};
use crate::features::activities::models::{ActivityType, NewActivity};
use crate::features::activities::repository as activity_repository;
use crate::features::subscriptions::repository as subscription_repository;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{validate_required_field, validate_text_length};
use crate::AppState;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde_json::json;

/// 処理中レジストリでの交渉の種別名
const IN_FLIGHT_KIND: &str = "negotiation";
/// 1メッセージの最大文字数
const MAX_MESSAGE_LENGTH: usize = 2000;

/// 交渉を開始する（トランザクション内から呼び出す）
///
/// プロバイダーの最初のメッセージを添えて active の交渉を作成し、
/// negotiation_created のアクティビティを追加する。提案節約額はサブスクリプションの
/// 月額換算の料金を上限とする
///
/// # 引数
/// * `conn` - データベース接続（トランザクション可）
/// * `responder` - 最初のメッセージを生成する返信者
/// * `new` - 交渉作成用DTO（検証済み）
/// * `now` - 作成日時
/// * `ttl_days` - 有効期限までの日数
pub(crate) fn open_negotiation(
    conn: &Connection,
    responder: &dyn ProviderResponder,
    new: &NewNegotiation,
    now: DateTime<Utc>,
    ttl_days: i64,
) -> AppResult<Negotiation> {
    let subscription = subscription_repository::find_by_id(conn, &new.subscription_id)?;
    let new = NewNegotiation {
        proposed_savings: negotiation_state::bound_proposed_savings(
            new.proposed_savings,
            subscription.normalized_monthly_cost(),
        ),
        ..new.clone()
    };

    let greeting = responder.greeting(&new, now);
    let expires_at = now + Duration::days(ttl_days);
    let negotiation = repository::insert(conn, &new, &[greeting], now, Some(expires_at))?;

    activity_repository::insert(
        conn,
        &NewActivity::new(
            ActivityType::NegotiationCreated,
            format!("{}との交渉を開始しました", negotiation.provider_name),
        )
        .with_meta_data(json!({
            "negotiation_id": negotiation.id,
            "subscription_id": negotiation.subscription_id,
            "proposed_savings": negotiation.proposed_savings,
        })),
        now,
    )?;

    Ok(negotiation)
}

/// 交渉を作成する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `new` - 交渉作成用DTO
///
/// # 戻り値
/// 作成された交渉、または失敗時はエラー
pub fn create_negotiation(state: &AppState, new: NewNegotiation) -> AppResult<Negotiation> {
    validate_required_field(&new.provider_name, "プロバイダー名")?;
    validate_text_length(new.provider_name.trim(), 100, "プロバイダー名")?;
    if !new.proposed_savings.is_finite() {
        return Err(AppError::validation("提案節約額が無効な数値です"));
    }

    let mut db = state.lock_db()?;
    let tx = db.transaction()?;
    let now = Utc::now();

    let negotiation = open_negotiation(
        &tx,
        state.responder.as_ref(),
        &new,
        now,
        state.config.negotiation_ttl_days,
    )?;
    tx.commit()?;

    log::info!(
        "交渉を作成しました: id={}, provider={}",
        negotiation.id,
        negotiation.provider_name
    );
    Ok(negotiation)
}

/// IDで交渉を取得する（期限切れは expired として返す）
pub fn get_negotiation(state: &AppState, id: &str) -> AppResult<Negotiation> {
    let db = state.lock_db()?;
    let negotiation = repository::find_by_id(&db, id)?;
    Ok(negotiation.presented(Utc::now()))
}

/// 交渉一覧を取得する
///
/// # 引数
/// * `status` - 指定した場合は実効状態で絞り込む
pub fn get_negotiations(
    state: &AppState,
    status: Option<NegotiationStatus>,
) -> AppResult<Vec<Negotiation>> {
    let db = state.lock_db()?;
    let now = Utc::now();

    let negotiations = repository::find_all(&db, None)?
        .into_iter()
        .map(|n| n.presented(now))
        .filter(|n| status.map_or(true, |s| n.status == s))
        .collect();

    Ok(negotiations)
}

/// 交渉にメッセージを送信する
///
/// 返信者の応答を待つ間はデータベースのロックを解放する。応答後に状態を
/// 再確認し、その間に拒否・期限切れになっていた場合は会話を保存しない。
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `id` - 交渉ID
/// * `text` - メッセージ本文
///
/// # 戻り値
/// 会話を更新した交渉、または失敗時はエラー
pub async fn send_message(state: &AppState, id: &str, text: &str) -> AppResult<Negotiation> {
    validate_required_field(text, "メッセージ")?;
    validate_text_length(text, MAX_MESSAGE_LENGTH, "メッセージ")?;

    let _guard = state.in_flight.try_acquire(IN_FLIGHT_KIND, id)?;

    let request = {
        let db = state.lock_db()?;
        let now = Utc::now();
        let mut negotiation = repository::find_by_id(&db, id)?;
        negotiation_state::apply(&negotiation, NegotiationEvent::SendMessage, now)?;

        let monthly_cost = match subscription_repository::find_by_id(&db, &negotiation.subscription_id) {
            Ok(subscription) => Some(subscription.normalized_monthly_cost()),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let timestamp = negotiation_state::next_timestamp(&negotiation.messages, now);
        negotiation.messages.push(Message::user(text.trim(), timestamp));

        ResponderRequest {
            negotiation,
            monthly_cost,
        }
    };

    let history = request.negotiation.messages.clone();
    let monthly_cost = request.monthly_cost;
    let previous_offer = request.negotiation.final_offer.clone();

    let patch = state.responder.respond(request).await?;
    negotiation_state::validate_patch(&history, &patch)?;

    // 最終オファーは提示された場合のみ置き換える
    let final_offer = match (patch.final_offer, monthly_cost) {
        (Some(offer), Some(cost)) => Some(negotiation_state::bound_final_offer(offer, cost)),
        (Some(offer), None) => Some(offer),
        (None, _) => previous_offer,
    };

    let mut db = state.lock_db()?;
    let tx = db.transaction()?;
    let now = Utc::now();

    let current = repository::find_by_id(&tx, id)?;
    if let Err(e) = negotiation_state::apply(&current, NegotiationEvent::SendMessage, now) {
        log::warn!("返信待ちの間に交渉が終了したため会話を破棄します: id={id}");
        return Err(e);
    }

    let updated =
        repository::replace_conversation(&tx, id, &patch.messages, final_offer.as_ref(), now)?;
    activity_repository::insert(
        &tx,
        &NewActivity::new(
            ActivityType::NegotiationMessage,
            format!("{}の交渉にメッセージを送信しました", updated.provider_name),
        )
        .with_meta_data(json!({
            "negotiation_id": updated.id,
            "message_count": updated.message_count(),
        })),
        now,
    )?;
    tx.commit()?;

    log::info!(
        "交渉メッセージを送信しました: id={id}, messages={}, final_offer={}",
        updated.message_count(),
        updated.final_offer.is_some()
    );
    Ok(updated.presented(now))
}

/// 最終オファーを承諾する
///
/// 交渉の状態、サブスクリプションの料金・プラン、アクティビティを
/// 1つのトランザクションで更新する
pub fn accept_offer(state: &AppState, id: &str) -> AppResult<Negotiation> {
    let _guard = state.in_flight.try_acquire(IN_FLIGHT_KIND, id)?;

    let mut db = state.lock_db()?;
    let tx = db.transaction()?;
    let now = Utc::now();

    let negotiation = repository::find_by_id(&tx, id)?;
    let next = negotiation_state::apply(&negotiation, NegotiationEvent::Accept, now)?;
    let offer = negotiation_state::require_final_offer(&negotiation)?;

    let subscription = subscription_repository::find_by_id(&tx, &negotiation.subscription_id)?;
    let plan = Some(offer.plan.trim()).filter(|p| !p.is_empty());
    let cost_per_cycle = subscription.billing_cycle.from_monthly(offer.price);
    subscription_repository::set_plan_and_cost(&tx, &subscription.id, plan, cost_per_cycle, now)?;

    let accepted = repository::set_status(&tx, id, next, now)?;
    activity_repository::insert(
        &tx,
        &NewActivity::new(
            ActivityType::RecommendationApplied,
            format!("{}のオファーを承諾しました", negotiation.provider_name),
        )
        .with_meta_data(json!({
            "negotiation_id": id,
            "subscription_id": subscription.id,
            "savings": offer.savings,
            "price": offer.price,
        })),
        now,
    )?;
    tx.commit()?;

    log::info!("交渉のオファーを承諾しました: id={id}, savings={}", offer.savings);
    Ok(accepted)
}

/// 交渉を拒否する（サブスクリプションは変更しない）
pub fn reject_negotiation(state: &AppState, id: &str) -> AppResult<Negotiation> {
    let mut db = state.lock_db()?;
    let tx = db.transaction()?;
    let now = Utc::now();

    let negotiation = repository::find_by_id(&tx, id)?;
    let next = negotiation_state::apply(&negotiation, NegotiationEvent::Reject, now)?;

    let rejected = repository::set_status(&tx, id, next, now)?;
    activity_repository::insert(
        &tx,
        &NewActivity::new(
            ActivityType::NegotiationRejected,
            format!("{}との交渉を終了しました", negotiation.provider_name),
        )
        .with_meta_data(json!({ "negotiation_id": id })),
        now,
    )?;
    tx.commit()?;

    log::info!("交渉を拒否しました: id={id}");
    Ok(rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::negotiations::models::{FinalOffer, MessageRole, NegotiationPatch};
    use crate::features::subscriptions::models::{BillingCycle, CreateSubscriptionDto, Subscription};
    use crate::shared::config::environment::AppConfig;
    use crate::shared::database::row::to_db_timestamp;
    use futures::future::BoxFuture;
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn setup_state() -> AppState {
        AppState::in_memory(AppConfig::default()).unwrap()
    }

    fn add_subscription(state: &AppState, name: &str, cost: f64) -> Subscription {
        let db = state.lock_db().unwrap();
        let mut dto = CreateSubscriptionDto::new(name, cost);
        dto.plan_name = "Premium".to_string();
        subscription_repository::create(&db, &dto, Utc::now()).unwrap()
    }

    fn new_negotiation(subscription: &Subscription, proposed_savings: f64) -> NewNegotiation {
        NewNegotiation {
            optimization_id: None,
            subscription_id: subscription.id.clone(),
            provider_name: subscription.service_name.clone(),
            current_plan: subscription.plan_name.clone(),
            proposed_savings,
        }
    }

    fn expire(state: &AppState, id: &str) {
        let db = state.lock_db().unwrap();
        db.execute(
            "UPDATE negotiations SET expires_at = ?1 WHERE id = ?2",
            rusqlite::params![to_db_timestamp(&(Utc::now() - Duration::hours(1))), id],
        )
        .unwrap();
    }

    fn stored_status(state: &AppState, id: &str) -> NegotiationStatus {
        let db = state.lock_db().unwrap();
        repository::find_by_id(&db, id).unwrap().status
    }

    #[test]
    fn test_create_negotiation_starts_with_greeting() {
        let state = setup_state();
        let subscription = add_subscription(&state, "Netflix", 55.90);

        let negotiation = create_negotiation(&state, new_negotiation(&subscription, 10.0)).unwrap();

        assert_eq!(negotiation.status, NegotiationStatus::Active);
        assert_eq!(negotiation.messages.len(), 1);
        assert_eq!(negotiation.messages[0].role, MessageRole::Provider);
        let expires_at = negotiation.expires_at.unwrap();
        assert_eq!((expires_at - negotiation.created_at).num_days(), 7);
    }

    #[test]
    fn test_create_negotiation_validation() {
        let state = setup_state();
        let subscription = add_subscription(&state, "Netflix", 55.90);

        let mut blank = new_negotiation(&subscription, 10.0);
        blank.provider_name = " ".to_string();
        assert!(matches!(
            create_negotiation(&state, blank),
            Err(AppError::Validation(_))
        ));

        let mut unknown = new_negotiation(&subscription, 10.0);
        unknown.subscription_id = "missing".to_string();
        assert!(matches!(
            create_negotiation(&state, unknown),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_negotiation_bounds_proposed_savings() {
        let state = setup_state();
        let spotify = add_subscription(&state, "Spotify", 21.90);

        let negotiation = create_negotiation(&state, new_negotiation(&spotify, 100.0)).unwrap();

        assert_eq!(negotiation.proposed_savings, 21.9);
        let db = state.lock_db().unwrap();
        assert_eq!(repository::find_by_id(&db, &negotiation.id).unwrap().proposed_savings, 21.9);
    }

    #[tokio::test]
    async fn test_full_negotiation_flow() {
        let state = setup_state();
        let subscription = add_subscription(&state, "Spotify", 21.90);
        let negotiation = create_negotiation(&state, new_negotiation(&subscription, 10.0)).unwrap();

        let after_first = send_message(&state, &negotiation.id, "Quero um desconto").await.unwrap();
        assert_eq!(after_first.messages.len(), 3);
        assert!(after_first.final_offer.is_none());

        // 最終オファーがない状態では承諾できない
        assert!(matches!(
            accept_offer(&state, &negotiation.id),
            Err(AppError::Precondition(_))
        ));

        let after_second = send_message(&state, &negotiation.id, "Pode melhorar?").await.unwrap();
        assert_eq!(after_second.messages.len(), 5);
        let offer = after_second.final_offer.clone().unwrap();
        assert_eq!(offer.savings, 6.0);

        // メッセージは時刻順
        assert!(after_second
            .messages
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));

        let accepted = accept_offer(&state, &negotiation.id).unwrap();
        assert_eq!(accepted.status, NegotiationStatus::Accepted);

        let db = state.lock_db().unwrap();
        let updated = subscription_repository::find_by_id(&db, &subscription.id).unwrap();
        assert_eq!(updated.monthly_cost, 15.9);
        let activities = activity_repository::find_recent(&db, 100, 0).unwrap();
        assert_eq!(activities[0].activity_type, ActivityType::RecommendationApplied);
    }

    #[tokio::test]
    async fn test_accept_converts_price_to_billing_cycle() {
        let state = setup_state();
        let subscription = {
            let db = state.lock_db().unwrap();
            let mut dto = CreateSubscriptionDto::new("iCloud", 120.0);
            dto.billing_cycle = BillingCycle::Yearly;
            subscription_repository::create(&db, &dto, Utc::now()).unwrap()
        };
        let negotiation = create_negotiation(&state, new_negotiation(&subscription, 5.0)).unwrap();

        send_message(&state, &negotiation.id, "Olá").await.unwrap();
        let with_offer = send_message(&state, &negotiation.id, "Desconto?").await.unwrap();
        assert_eq!(with_offer.final_offer.as_ref().unwrap().price, 7.0);

        accept_offer(&state, &negotiation.id).unwrap();
        let db = state.lock_db().unwrap();
        let updated = subscription_repository::find_by_id(&db, &subscription.id).unwrap();
        assert_eq!(updated.monthly_cost, 84.0);
    }

    #[tokio::test]
    async fn test_terminal_states_reject_operations() {
        let state = setup_state();
        let subscription = add_subscription(&state, "Netflix", 55.90);
        let negotiation = create_negotiation(&state, new_negotiation(&subscription, 10.0)).unwrap();

        reject_negotiation(&state, &negotiation.id).unwrap();

        assert!(matches!(
            send_message(&state, &negotiation.id, "Olá").await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            accept_offer(&state, &negotiation.id),
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            reject_negotiation(&state, &negotiation.id),
            Err(AppError::InvalidState(_))
        ));

        let db = state.lock_db().unwrap();
        let unchanged = subscription_repository::find_by_id(&db, &subscription.id).unwrap();
        assert_eq!(unchanged.monthly_cost, 55.90);
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected() {
        let state = setup_state();
        let subscription = add_subscription(&state, "Netflix", 55.90);
        let negotiation = create_negotiation(&state, new_negotiation(&subscription, 10.0)).unwrap();

        assert!(matches!(
            send_message(&state, &negotiation.id, "   ").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_expiry_is_derived_without_write() {
        let state = setup_state();
        let subscription = add_subscription(&state, "Netflix", 55.90);
        let negotiation = create_negotiation(&state, new_negotiation(&subscription, 10.0)).unwrap();
        expire(&state, &negotiation.id);

        let read = get_negotiation(&state, &negotiation.id).unwrap();
        assert_eq!(read.status, NegotiationStatus::Expired);
        assert_eq!(stored_status(&state, &negotiation.id), NegotiationStatus::Active);

        let expired = get_negotiations(&state, Some(NegotiationStatus::Expired)).unwrap();
        assert_eq!(expired.len(), 1);
        assert!(get_negotiations(&state, Some(NegotiationStatus::Active))
            .unwrap()
            .is_empty());

        assert!(matches!(
            send_message(&state, &negotiation.id, "Olá").await,
            Err(AppError::InvalidState(_))
        ));
        assert_eq!(stored_status(&state, &negotiation.id), NegotiationStatus::Active);
    }

    /// 合図があるまで返信を保留する返信者
    struct BlockingResponder {
        release: Arc<Notify>,
        entered: Arc<Notify>,
    }

    impl ProviderResponder for BlockingResponder {
        fn respond(&self, request: ResponderRequest) -> BoxFuture<'_, AppResult<NegotiationPatch>> {
            Box::pin(async move {
                self.entered.notify_one();
                self.release.notified().await;
                let mut messages = request.negotiation.messages;
                let timestamp = negotiation_state::next_timestamp(&messages, Utc::now());
                messages.push(Message::provider("Vou verificar", timestamp));
                Ok(NegotiationPatch {
                    messages,
                    final_offer: None,
                })
            })
        }
    }

    fn blocking_state() -> (Arc<AppState>, Arc<Notify>, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());
        let state = setup_state().with_responder(Arc::new(BlockingResponder {
            release: Arc::clone(&release),
            entered: Arc::clone(&entered),
        }));
        (Arc::new(state), release, entered)
    }

    #[tokio::test]
    async fn test_concurrent_send_fails_with_in_flight() {
        let (state, release, entered) = blocking_state();
        let subscription = add_subscription(&state, "Netflix", 55.90);
        let negotiation = create_negotiation(&state, new_negotiation(&subscription, 10.0)).unwrap();

        let first = {
            let state = Arc::clone(&state);
            let id = negotiation.id.clone();
            tokio::spawn(async move { send_message(&state, &id, "Primeira").await })
        };
        entered.notified().await;

        let second = send_message(&state, &negotiation.id, "Segunda").await;
        assert!(matches!(second, Err(AppError::InFlight(_))));

        release.notify_one();
        let updated = first.await.unwrap().unwrap();
        assert_eq!(updated.messages.len(), 3);
        assert_eq!(updated.messages[1].content, "Primeira");
    }

    #[tokio::test]
    async fn test_reject_during_send_wins() {
        let (state, release, entered) = blocking_state();
        let subscription = add_subscription(&state, "Netflix", 55.90);
        let negotiation = create_negotiation(&state, new_negotiation(&subscription, 10.0)).unwrap();

        let pending = {
            let state = Arc::clone(&state);
            let id = negotiation.id.clone();
            tokio::spawn(async move { send_message(&state, &id, "Olá").await })
        };
        entered.notified().await;

        reject_negotiation(&state, &negotiation.id).unwrap();
        release.notify_one();

        assert!(matches!(pending.await.unwrap(), Err(AppError::InvalidState(_))));
        let read = get_negotiation(&state, &negotiation.id).unwrap();
        assert_eq!(read.status, NegotiationStatus::Rejected);
        assert_eq!(read.messages.len(), 1);
    }

    /// 履歴を書き換えた会話を返す返信者
    struct RewritingResponder;

    impl ProviderResponder for RewritingResponder {
        fn respond(&self, _request: ResponderRequest) -> BoxFuture<'_, AppResult<NegotiationPatch>> {
            Box::pin(async move {
                Ok(NegotiationPatch {
                    messages: vec![Message::provider("Histórico novo", Utc::now())],
                    final_offer: Some(FinalOffer {
                        plan: String::new(),
                        price: 1.0,
                        savings: 1.0,
                        terms: String::new(),
                    }),
                })
            })
        }
    }

    #[tokio::test]
    async fn test_invalid_patch_is_not_applied() {
        let state = setup_state().with_responder(Arc::new(RewritingResponder));
        let subscription = add_subscription(&state, "Netflix", 55.90);
        let negotiation = create_negotiation(&state, new_negotiation(&subscription, 10.0)).unwrap();

        let result = send_message(&state, &negotiation.id, "Olá").await;
        assert!(matches!(result, Err(AppError::ExternalService(_))));

        let read = get_negotiation(&state, &negotiation.id).unwrap();
        assert_eq!(read.messages, negotiation.messages);
        assert!(read.final_offer.is_none());
    }
}
