//! 交渉メッセージへのプロバイダー返信
//!
//! 実際の返信生成は外部の協調者が行う。ここではその境界となるトレイトと、
//! ローカル検証用の決定的な返信者を提供する。

use super::models::{FinalOffer, Message, MessageRole, Negotiation, NegotiationPatch, NewNegotiation};
use super::state::next_timestamp;
use crate::shared::errors::AppResult;
use crate::shared::utils::round_currency;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

/// 返信者に渡す依頼内容
#[derive(Debug, Clone)]
pub struct ResponderRequest {
    /// ユーザーの新しいメッセージを末尾に追加済みの交渉
    pub negotiation: Negotiation,
    /// 対象サブスクリプションの月額換算の料金（削除済みの場合はNone）
    pub monthly_cost: Option<f64>,
}

/// プロバイダーの返信を生成する協調者
pub trait ProviderResponder: Send + Sync {
    /// 会話全体を受け取り、置き換え後の会話を返す
    fn respond(&self, request: ResponderRequest) -> BoxFuture<'_, AppResult<NegotiationPatch>>;

    /// 交渉開始時の最初のメッセージ
    fn greeting(&self, negotiation: &NewNegotiation, now: DateTime<Utc>) -> Message {
        Message::provider(
            format!(
                "Olá! Aqui é o atendimento {}. Recebemos sua solicitação de negociação. Qual desconto você gostaria de solicitar?",
                negotiation.provider_name
            ),
            now,
        )
    }
}

/// 最終オファーを提示するまでのユーザーメッセージ数
const OFFER_AFTER_USER_MESSAGES: usize = 2;
/// 提案された節約額のうち最終オファーで提示する割合
const OFFER_SAVINGS_RATE: f64 = 0.6;
const OFFER_TERMS: &str = "12-month contract with loyalty discount";

/// 台本どおりに返信する決定的な返信者
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponder;

impl ScriptedResponder {
    pub fn new() -> Self {
        Self
    }

    fn replies_for(provider_name: &str) -> [&'static str; 3] {
        match provider_name {
            "Netflix" => [
                "Ótimo! Posso oferecer 15% de desconto no seu plano Premium.",
                "Temos um plano especial para clientes leais. Você gostaria de tentar?",
                "Perfeito! Vou processar seu desconto. Você verá a mudança no próximo ciclo de cobrança.",
            ],
            "Spotify" => [
                "Entendo. Para clientes de longa data, posso oferecer a versão Premium a preço promocional.",
                "Que tal uma redução de 20% no seu plano Spotify Premium?",
                "Aceito! Você receberá um email de confirmação em breve.",
            ],
            "Adobe Creative Cloud" => [
                "Excelente! Como cliente de longa data, você merece um desconto.",
                "Posso oferecer 18% de desconto no seu plano anual.",
                "Perfeito! Vou confirmar isso para você agora.",
            ],
            _ => [
                "Entendo sua situação. Deixe-me verificar o que posso fazer por você.",
                "Ótimo! Temos algumas opções disponíveis.",
                "Concordo! Vou processar isso para você.",
            ],
        }
    }

    /// 会話に対する返信内容と最終オファーを決める
    fn script(request: &ResponderRequest) -> (String, Option<FinalOffer>) {
        let negotiation = &request.negotiation;
        let last_user_message = negotiation
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let replies = Self::replies_for(&negotiation.provider_name);
        let reply = replies[last_user_message.chars().count() % replies.len()].to_string();

        let user_messages = negotiation
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count();

        if negotiation.final_offer.is_some() || user_messages < OFFER_AFTER_USER_MESSAGES {
            return (reply, None);
        }

        let cost = request.monthly_cost.unwrap_or(0.0).max(0.0);
        let savings = round_currency((negotiation.proposed_savings * OFFER_SAVINGS_RATE).clamp(0.0, cost));
        let offer = FinalOffer {
            plan: negotiation.current_plan.clone(),
            price: round_currency(cost - savings),
            savings,
            terms: OFFER_TERMS.to_string(),
        };

        (reply, Some(offer))
    }
}

impl ProviderResponder for ScriptedResponder {
    fn respond(&self, request: ResponderRequest) -> BoxFuture<'_, AppResult<NegotiationPatch>> {
        let (reply, final_offer) = Self::script(&request);
        let mut messages = request.negotiation.messages;
        let timestamp = next_timestamp(&messages, Utc::now());
        messages.push(Message::provider(reply, timestamp));

        Box::pin(futures::future::ready(Ok(NegotiationPatch {
            messages,
            final_offer,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::negotiations::models::NegotiationStatus;

    fn request(messages: Vec<Message>, proposed_savings: f64, monthly_cost: f64) -> ResponderRequest {
        let now = Utc::now();
        ResponderRequest {
            negotiation: Negotiation {
                id: "neg-1".to_string(),
                optimization_id: None,
                subscription_id: "sub-1".to_string(),
                provider_name: "Spotify".to_string(),
                current_plan: "Premium Individual".to_string(),
                proposed_savings,
                status: NegotiationStatus::Active,
                messages,
                final_offer: None,
                created_at: now,
                updated_at: now,
                expires_at: None,
            },
            monthly_cost: Some(monthly_cost),
        }
    }

    #[tokio::test]
    async fn test_first_message_gets_reply_without_offer() {
        let history = vec![Message::provider("Olá", Utc::now()), Message::user("Oi", Utc::now())];
        let patch = ScriptedResponder::new()
            .respond(request(history.clone(), 10.0, 21.90))
            .await
            .unwrap();

        assert_eq!(patch.messages.len(), 3);
        assert_eq!(patch.messages[..2], history[..]);
        assert_eq!(patch.messages[2].role, MessageRole::Provider);
        // "Oi" は2文字なので3件の台本のうち3番目
        assert_eq!(
            patch.messages[2].content,
            "Aceito! Você receberá um email de confirmação em breve."
        );
        assert!(patch.final_offer.is_none());
    }

    #[tokio::test]
    async fn test_second_user_message_yields_bounded_offer() {
        let now = Utc::now();
        let history = vec![
            Message::user("Quero desconto", now),
            Message::provider("Ok", now),
            Message::user("Pode melhorar?", now),
        ];

        let patch = ScriptedResponder::new()
            .respond(request(history.clone(), 10.0, 21.90))
            .await
            .unwrap();
        let offer = patch.final_offer.unwrap();
        assert_eq!(offer.savings, 6.0);
        assert_eq!(offer.price, 15.9);
        assert_eq!(offer.plan, "Premium Individual");

        // 節約額は月額を超えない
        let patch = ScriptedResponder::new()
            .respond(request(history, 100.0, 21.90))
            .await
            .unwrap();
        let offer = patch.final_offer.unwrap();
        assert_eq!(offer.savings, 21.9);
        assert_eq!(offer.price, 0.0);
    }

    #[test]
    fn test_default_greeting_mentions_provider() {
        let new = NewNegotiation {
            optimization_id: None,
            subscription_id: "sub-1".to_string(),
            provider_name: "Netflix".to_string(),
            current_plan: String::new(),
            proposed_savings: 0.0,
        };
        let greeting = ScriptedResponder::new().greeting(&new, Utc::now());
        assert_eq!(greeting.role, MessageRole::Provider);
        assert!(greeting.content.contains("Netflix"));
    }
}
