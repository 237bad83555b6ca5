//! 交渉の状態遷移と会話差分の検証

use super::models::{FinalOffer, Message, Negotiation, NegotiationPatch, NegotiationStatus};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::round_currency;
use chrono::{DateTime, Utc};

/// 交渉に対する操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationEvent {
    SendMessage,
    Accept,
    Reject,
}

impl NegotiationEvent {
    fn label(&self) -> &'static str {
        match self {
            NegotiationEvent::SendMessage => "メッセージ送信",
            NegotiationEvent::Accept => "承諾",
            NegotiationEvent::Reject => "拒否",
        }
    }
}

/// 状態遷移を計算する
///
/// # 引数
/// * `current` - 実効状態（期限切れを反映済み）
/// * `event` - 操作
///
/// # 戻り値
/// 遷移後の状態、または終端状態からの操作の場合はInvalidStateエラー
pub fn transition(current: NegotiationStatus, event: NegotiationEvent) -> AppResult<NegotiationStatus> {
    match (current, event) {
        (NegotiationStatus::Active, NegotiationEvent::SendMessage) => Ok(NegotiationStatus::Active),
        (NegotiationStatus::Active, NegotiationEvent::Accept) => Ok(NegotiationStatus::Accepted),
        (NegotiationStatus::Active, NegotiationEvent::Reject) => Ok(NegotiationStatus::Rejected),
        (status, event) => Err(AppError::invalid_state(format!(
            "{status}状態の交渉では{}できません",
            event.label()
        ))),
    }
}

/// 交渉に操作を適用できるか確認し、遷移後の状態を返す
pub fn apply(
    negotiation: &Negotiation,
    event: NegotiationEvent,
    now: DateTime<Utc>,
) -> AppResult<NegotiationStatus> {
    transition(negotiation.effective_status(now), event)
}

/// 承諾の事前条件を確認する
///
/// # 戻り値
/// 承諾対象の最終オファー、または未提示の場合はPreconditionエラー
pub fn require_final_offer(negotiation: &Negotiation) -> AppResult<&FinalOffer> {
    negotiation
        .final_offer
        .as_ref()
        .ok_or_else(|| AppError::precondition("最終オファーがまだ提示されていません"))
}

/// 会話差分を検証する
///
/// 差分のメッセージ列は既存の履歴をそのまま先頭に含み、時刻順に並んでいる必要がある
///
/// # 引数
/// * `history` - 送信済みの履歴（ユーザーの新しいメッセージを含む）
/// * `patch` - 返信者から返された差分
pub fn validate_patch(history: &[Message], patch: &NegotiationPatch) -> AppResult<()> {
    if patch.messages.len() < history.len() || patch.messages[..history.len()] != *history {
        return Err(AppError::external_service(
            "交渉返信",
            "返信に既存のメッセージ履歴が含まれていません",
        ));
    }

    let out_of_order = patch
        .messages
        .windows(2)
        .any(|pair| pair[1].timestamp < pair[0].timestamp);
    if out_of_order {
        return Err(AppError::external_service(
            "交渉返信",
            "返信のメッセージが時刻順に並んでいません",
        ));
    }

    if let Some(offer) = &patch.final_offer {
        if !offer.price.is_finite() || !offer.savings.is_finite() || offer.price < 0.0 {
            return Err(AppError::external_service(
                "交渉返信",
                "最終オファーの金額が不正です",
            ));
        }
    }

    Ok(())
}

/// 最終オファーの節約額をサブスクリプションの月額以内に収める
///
/// # 引数
/// * `offer` - 返信者が提示したオファー
/// * `monthly_cost` - サブスクリプションの月額換算の料金
pub fn bound_final_offer(mut offer: FinalOffer, monthly_cost: f64) -> FinalOffer {
    let max_savings = monthly_cost.max(0.0);

    if offer.savings > max_savings {
        log::warn!(
            "最終オファーの節約額が月額を超えているため補正します: savings={}, monthly_cost={max_savings}",
            offer.savings
        );
        offer.savings = round_currency(max_savings);
        offer.price = round_currency((max_savings - offer.savings).max(0.0));
    }

    offer
}

/// 交渉開始時の提案節約額を 0 以上、月額以下に収める
pub fn bound_proposed_savings(proposed_savings: f64, monthly_cost: f64) -> f64 {
    let max_savings = monthly_cost.max(0.0);

    if proposed_savings > max_savings {
        log::warn!(
            "提案節約額が月額を超えているため補正します: proposed={proposed_savings}, monthly_cost={max_savings}"
        );
    }
    round_currency(proposed_savings.clamp(0.0, max_savings))
}

/// 新しいメッセージの時刻（履歴より前にならないようにする）
pub fn next_timestamp(history: &[Message], now: DateTime<Utc>) -> DateTime<Utc> {
    history
        .last()
        .map(|last| last.timestamp.max(now))
        .unwrap_or(now)
}
