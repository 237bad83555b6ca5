//! ローカルのルールベース分析
//!
//! 推薦エンジンに接続できない環境（オフライン・開発時）で、
//! 料金のみからサブスクリプションの分析結果を作成する。

use super::models::{ActionType, SubscriptionAnalysis};
use crate::features::subscriptions::models::Subscription;
use crate::shared::utils::round_currency;

/// この月額を超える場合はダウングレードを提案する
const DOWNGRADE_THRESHOLD: f64 = 100.0;
/// この月額を超える場合は交渉を提案する
const NEGOTIATE_THRESHOLD: f64 = 50.0;

const DOWNGRADE_SAVINGS_RATE: f64 = 0.3;
const NEGOTIATE_SAVINGS_RATE: f64 = 0.15;

/// サブスクリプションを分析する
///
/// # 引数
/// * `subscription` - 分析対象のサブスクリプション
///
/// # 戻り値
/// 月額換算の料金に基づく分析結果
pub fn analyze(subscription: &Subscription) -> SubscriptionAnalysis {
    let cost = subscription.normalized_monthly_cost();

    if cost > DOWNGRADE_THRESHOLD {
        let plan = if subscription.plan_name.is_empty() {
            "atual".to_string()
        } else {
            subscription.plan_name.clone()
        };

        SubscriptionAnalysis {
            recommendation_type: ActionType::Downgrade,
            monthly_savings: round_currency(cost * DOWNGRADE_SAVINGS_RATE),
            confidence: 0.85,
            reasoning: format!(
                "O plano {plan} parece caro. Considere um plano mais básico que pode atender suas necessidades."
            ),
            suggested_plan: Some("Plano Básico".to_string()),
            action_steps: steps(&[
                "Revise suas funcionalidades mais usadas",
                "Compare com planos mais baratos",
                "Entre em contato com suporte para downgrade",
            ]),
        }
    } else if cost > NEGOTIATE_THRESHOLD {
        SubscriptionAnalysis {
            recommendation_type: ActionType::Negotiate,
            monthly_savings: round_currency(cost * NEGOTIATE_SAVINGS_RATE),
            confidence: 0.75,
            reasoning: "Como cliente de longa data, você pode conseguir um desconto de fidelidade."
                .to_string(),
            suggested_plan: None,
            action_steps: steps(&[
                "Entre em contato com suporte",
                "Mencione que é cliente há muito tempo",
                "Peça desconto de fidelidade",
            ]),
        }
    } else {
        SubscriptionAnalysis {
            recommendation_type: ActionType::Keep,
            monthly_savings: 0.0,
            confidence: 0.9,
            reasoning: "O custo está bom para o serviço oferecido. Continue monitorando o uso."
                .to_string(),
            suggested_plan: None,
            action_steps: steps(&["Continue usando normalmente", "Monitore seu uso mensalmente"]),
        }
    }
}

fn steps(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::models::{BillingCycle, SubscriptionStatus};
    use chrono::Utc;

    fn subscription(cost: f64, cycle: BillingCycle) -> Subscription {
        Subscription {
            id: "sub-1".to_string(),
            service_name: "Adobe".to_string(),
            service_category: "software".to_string(),
            plan_name: "All Apps".to_string(),
            monthly_cost: cost,
            billing_cycle: cycle,
            status: SubscriptionStatus::Active,
            detection_source: None,
            last_used_date: None,
            next_billing_date: None,
            confidence_score: 1.0,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_expensive_plan_is_downgraded() {
        let analysis = analyze(&subscription(124.0, BillingCycle::Monthly));
        assert_eq!(analysis.recommendation_type, ActionType::Downgrade);
        assert_eq!(analysis.monthly_savings, 37.2);
        assert_eq!(analysis.suggested_plan.as_deref(), Some("Plano Básico"));
        assert!(analysis.reasoning.contains("All Apps"));
    }

    #[test]
    fn test_mid_range_plan_is_negotiated() {
        let analysis = analyze(&subscription(60.0, BillingCycle::Monthly));
        assert_eq!(analysis.recommendation_type, ActionType::Negotiate);
        assert_eq!(analysis.monthly_savings, 9.0);
        assert_eq!(analysis.confidence, 0.75);
    }

    #[test]
    fn test_uses_normalized_cost() {
        // 年額600は月額50相当のため維持
        let analysis = analyze(&subscription(600.0, BillingCycle::Yearly));
        assert_eq!(analysis.recommendation_type, ActionType::Keep);
        assert_eq!(analysis.monthly_savings, 0.0);
    }
}
