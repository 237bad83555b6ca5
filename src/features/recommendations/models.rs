use crate::shared::utils::round_currency;
use crate::shared::utils::serde_compat::{bool_from_int, lenient_datetime, lenient_datetime_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// レコメンデーションのアクション種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Cancel,
    Downgrade,
    Switch,
    Negotiate,
    Keep,
    Bundle,
    /// サーバーが追加した未知の種別
    #[serde(other)]
    Other,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Cancel => "cancel",
            ActionType::Downgrade => "downgrade",
            ActionType::Switch => "switch",
            ActionType::Negotiate => "negotiate",
            ActionType::Keep => "keep",
            ActionType::Bundle => "bundle",
            ActionType::Other => "other",
        }
    }

    /// 実行時にサブスクリプションの料金・プランを変更するか
    pub fn changes_plan(&self) -> bool {
        matches!(self, ActionType::Downgrade | ActionType::Switch)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = std::convert::Infallible;

    /// 未知の値は `Other` として扱う
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "cancel" => ActionType::Cancel,
            "downgrade" => ActionType::Downgrade,
            "switch" => ActionType::Switch,
            "negotiate" => ActionType::Negotiate,
            "keep" => ActionType::Keep,
            "bundle" => ActionType::Bundle,
            _ => ActionType::Other,
        })
    }
}

/// レコメンデーション（最適化提案）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub subscription_id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub current_plan: String,
    #[serde(default)]
    pub recommended_plan: Option<String>,
    #[serde(default)]
    pub current_cost: f64,
    #[serde(default)]
    pub new_cost: Option<f64>,
    /// 月額の節約額（負の値は付加価値のための値上げを表す）
    pub monthly_savings: f64,
    pub confidence_score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub steps_required: Vec<String>,
    #[serde(default, deserialize_with = "bool_from_int")]
    pub executed: bool,
    #[serde(default, with = "lenient_datetime_option")]
    pub execution_date: Option<DateTime<Utc>>,
    #[serde(with = "lenient_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Recommendation {
    /// 年間の節約額（月額の12倍）
    pub fn yearly_savings(&self) -> f64 {
        round_currency(self.monthly_savings * 12.0)
    }

    pub fn is_pending(&self) -> bool {
        !self.executed
    }
}

/// レコメンデーション登録用DTO（推薦エンジンの出力）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecommendation {
    pub subscription_id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub recommended_plan: Option<String>,
    #[serde(default)]
    pub new_cost: Option<f64>,
    pub monthly_savings: f64,
    pub confidence_score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub steps_required: Vec<String>,
}

impl NewRecommendation {
    pub fn new<S: Into<String>>(
        subscription_id: S,
        action_type: ActionType,
        monthly_savings: f64,
        confidence_score: f64,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            action_type,
            recommended_plan: None,
            new_cost: None,
            monthly_savings,
            confidence_score,
            reasoning: String::new(),
            steps_required: Vec::new(),
        }
    }

    pub fn with_recommended_plan<S: Into<String>>(mut self, plan: S) -> Self {
        self.recommended_plan = Some(plan.into());
        self
    }

    pub fn with_new_cost(mut self, new_cost: f64) -> Self {
        self.new_cost = Some(new_cost);
        self
    }

    pub fn with_reasoning<S: Into<String>>(mut self, reasoning: S) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps_required = steps;
        self
    }

    /// 分析結果からレコメンデーションを作成する
    ///
    /// # 引数
    /// * `subscription_id` - 分析対象のサブスクリプションID
    /// * `analysis` - `/api/subscriptions/{id}/analyze` の分析結果
    pub fn from_analysis<S: Into<String>>(subscription_id: S, analysis: &SubscriptionAnalysis) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            action_type: analysis.recommendation_type,
            recommended_plan: analysis.suggested_plan.clone(),
            new_cost: None,
            monthly_savings: round_currency(analysis.monthly_savings),
            confidence_score: analysis.confidence,
            reasoning: analysis.reasoning.clone(),
            steps_required: analysis.action_steps.clone(),
        }
    }
}

/// サブスクリプションの分析結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionAnalysis {
    pub recommendation_type: ActionType,
    pub monthly_savings: f64,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub suggested_plan: Option<String>,
    #[serde(default)]
    pub action_steps: Vec<String>,
}

/// 分析APIのレスポンス
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: SubscriptionAnalysis,
}

/// レコメンデーションの実行結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub savings_achieved: Option<f64>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// negotiate の実行で作成された交渉
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiation_id: Option<String>,
}

/// 最適化の実績
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResults {
    pub total_optimizations: u64,
    pub executed_optimizations: u64,
    pub monthly_savings: f64,
    pub yearly_savings: f64,
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_parsing() {
        assert_eq!("negotiate".parse::<ActionType>().unwrap(), ActionType::Negotiate);
        assert_eq!("upgrade".parse::<ActionType>().unwrap(), ActionType::Other);

        let parsed: ActionType = serde_json::from_str(r#""bundle""#).unwrap();
        assert_eq!(parsed, ActionType::Bundle);
        let unknown: ActionType = serde_json::from_str(r#""pause""#).unwrap();
        assert_eq!(unknown, ActionType::Other);
    }

    #[test]
    fn test_deserialize_backend_recommendation() {
        let json = r#"{
            "id": "opt-1", "subscription_id": "sub-1", "user_id": "u-1",
            "action_type": "downgrade", "current_plan": "Premium", "recommended_plan": "Basic",
            "current_cost": 55.9, "new_cost": 25.9, "monthly_savings": 30.0, "yearly_savings": 360.0,
            "confidence_score": 0.82, "reasoning": "Uso baixo", "steps_required": ["Abrir conta"],
            "estimated_time_minutes": 5, "presented_to_user": false, "user_feedback": null,
            "executed": false, "execution_date": null, "actual_savings": null, "notes": null,
            "created_at": "2024-03-01T10:00:00", "updated_at": "2024-03-01T10:00:00"
        }"#;

        let recommendation: Recommendation = serde_json::from_str(json).unwrap();
        assert_eq!(recommendation.action_type, ActionType::Downgrade);
        assert_eq!(recommendation.new_cost, Some(25.9));
        assert_eq!(recommendation.yearly_savings(), 360.0);
        assert!(recommendation.is_pending());
    }

    #[test]
    fn test_from_analysis() {
        let analysis = SubscriptionAnalysis {
            recommendation_type: ActionType::Downgrade,
            monthly_savings: 37.197,
            confidence: 0.85,
            reasoning: "Plano caro".to_string(),
            suggested_plan: Some("Plano Básico".to_string()),
            action_steps: vec!["Compare planos".to_string()],
        };

        let new = NewRecommendation::from_analysis("sub-1", &analysis);
        assert_eq!(new.monthly_savings, 37.2);
        assert_eq!(new.recommended_plan.as_deref(), Some("Plano Básico"));
        assert_eq!(new.steps_required, vec!["Compare planos"]);
    }
}
