//! レコメンデーションの表示用変換（純粋関数のみ）

use super::models::{ActionType, Recommendation};
use serde::Serialize;
use std::cmp::Ordering;

/// 表示トーン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Danger,
    Warning,
    Success,
}

/// アクションの表示内容
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayAction {
    pub label: &'static str,
    pub icon: &'static str,
    pub tone: Tone,
}

/// アクション種別から表示内容を決める
pub fn display_action(action_type: ActionType) -> DisplayAction {
    match action_type {
        ActionType::Cancel => DisplayAction {
            label: "Cancel",
            icon: "alert-circle",
            tone: Tone::Danger,
        },
        ActionType::Downgrade => DisplayAction {
            label: "Downgrade",
            icon: "trending-down",
            tone: Tone::Warning,
        },
        ActionType::Switch => DisplayAction {
            label: "Switch Plan",
            icon: "trending-down",
            tone: Tone::Success,
        },
        ActionType::Negotiate => DisplayAction {
            label: "Negotiate",
            icon: "check-circle",
            tone: Tone::Success,
        },
        ActionType::Keep | ActionType::Bundle | ActionType::Other => DisplayAction {
            label: "Apply",
            icon: "check-circle",
            tone: Tone::Success,
        },
    }
}

/// 信頼度をパーセント表示用の整数に変換する（0〜100に丸める）
pub fn confidence_percent(score: f64) -> u8 {
    if !score.is_finite() {
        return 0;
    }
    (score * 100.0).round().clamp(0.0, 100.0) as u8
}

/// 表示順の比較（節約額の降順、同額なら信頼度の降順）
pub fn compare_for_display(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.monthly_savings
        .total_cmp(&a.monthly_savings)
        .then_with(|| b.confidence_score.total_cmp(&a.confidence_score))
}

/// レコメンデーションを表示順に並べ替える
///
/// 同順位のものは元の順序を保つ
pub fn rank(mut recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    recommendations.sort_by(compare_for_display);
    recommendations
}

/// レコメンデーションの表示用カード
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationCard {
    pub id: String,
    pub subscription_id: String,
    pub action: DisplayAction,
    pub confidence_percent: u8,
    pub monthly_savings: f64,
    pub yearly_savings: f64,
    /// 節約ではなく付加価値のための値上げ
    pub is_cost_increase: bool,
    pub reasoning: String,
}

impl From<&Recommendation> for RecommendationCard {
    fn from(recommendation: &Recommendation) -> Self {
        Self {
            id: recommendation.id.clone(),
            subscription_id: recommendation.subscription_id.clone(),
            action: display_action(recommendation.action_type),
            confidence_percent: confidence_percent(recommendation.confidence_score),
            monthly_savings: recommendation.monthly_savings,
            yearly_savings: recommendation.yearly_savings(),
            is_cost_increase: recommendation.monthly_savings < 0.0,
            reasoning: recommendation.reasoning.clone(),
        }
    }
}

/// 表示順に並べたカード一覧を作成する
pub fn present(recommendations: Vec<Recommendation>) -> Vec<RecommendationCard> {
    rank(recommendations)
        .iter()
        .map(RecommendationCard::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quickcheck_macros::quickcheck;

    fn recommendation(id: &str, savings: f64, confidence: f64) -> Recommendation {
        Recommendation {
            id: id.to_string(),
            subscription_id: "sub-1".to_string(),
            action_type: ActionType::Downgrade,
            current_plan: String::new(),
            recommended_plan: None,
            current_cost: 50.0,
            new_cost: None,
            monthly_savings: savings,
            confidence_score: confidence,
            reasoning: String::new(),
            steps_required: Vec::new(),
            executed: false,
            execution_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_action_table() {
        assert_eq!(display_action(ActionType::Cancel).label, "Cancel");
        assert_eq!(display_action(ActionType::Downgrade).label, "Downgrade");
        assert_eq!(display_action(ActionType::Switch).label, "Switch Plan");
        assert_eq!(display_action(ActionType::Negotiate).label, "Negotiate");
        assert_eq!(display_action(ActionType::Keep).label, "Apply");
        assert_eq!(display_action(ActionType::Bundle).label, "Apply");
        assert_eq!(display_action(ActionType::Other).label, "Apply");
        assert_eq!(display_action(ActionType::Cancel).tone, Tone::Danger);
    }

    #[test]
    fn test_confidence_percent() {
        assert_eq!(confidence_percent(0.856), 86);
        assert_eq!(confidence_percent(0.0), 0);
        assert_eq!(confidence_percent(1.0), 100);
        assert_eq!(confidence_percent(1.7), 100);
        assert_eq!(confidence_percent(-0.2), 0);
        assert_eq!(confidence_percent(f64::NAN), 0);
    }

    #[test]
    fn test_rank_by_savings_then_confidence() {
        let ranked = rank(vec![
            recommendation("low", 5.0, 0.9),
            recommendation("tie-low-confidence", 20.0, 0.6),
            recommendation("negative", -10.0, 0.99),
            recommendation("tie-high-confidence", 20.0, 0.8),
        ]);

        let ids: Vec<_> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["tie-high-confidence", "tie-low-confidence", "low", "negative"]);
    }

    #[test]
    fn test_card_marks_cost_increase() {
        let card = RecommendationCard::from(&recommendation("r", -15.0, 0.7));
        assert!(card.is_cost_increase);
        assert_eq!(card.yearly_savings, -180.0);
        assert_eq!(card.confidence_percent, 70);
    }

    #[quickcheck]
    fn prop_rank_is_sorted(values: Vec<(i32, u8)>) -> bool {
        let recommendations = values
            .iter()
            .enumerate()
            .map(|(i, (cents, confidence))| {
                recommendation(&i.to_string(), *cents as f64 / 100.0, *confidence as f64 / 255.0)
            })
            .collect();

        let ranked = rank(recommendations);
        ranked
            .windows(2)
            .all(|pair| compare_for_display(&pair[0], &pair[1]) != Ordering::Greater)
    }
}
