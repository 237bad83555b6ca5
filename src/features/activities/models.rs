use crate::shared::utils::serde_compat::{bool_from_int, lenient_datetime};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// アクティビティの種類（ドメインイベント）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    EmailConnected,
    SubscriptionAdded,
    SubscriptionUpdated,
    SubscriptionDeleted,
    AiAnalysis,
    RecommendationApplied,
    NegotiationCreated,
    NegotiationMessage,
    NegotiationRejected,
    ReportGenerated,
    /// サーバーが追加した未知の種類
    #[serde(other)]
    Other,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::EmailConnected => "email_connected",
            ActivityType::SubscriptionAdded => "subscription_added",
            ActivityType::SubscriptionUpdated => "subscription_updated",
            ActivityType::SubscriptionDeleted => "subscription_deleted",
            ActivityType::AiAnalysis => "ai_analysis",
            ActivityType::RecommendationApplied => "recommendation_applied",
            ActivityType::NegotiationCreated => "negotiation_created",
            ActivityType::NegotiationMessage => "negotiation_message",
            ActivityType::NegotiationRejected => "negotiation_rejected",
            ActivityType::ReportGenerated => "report_generated",
            ActivityType::Other => "other",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = std::convert::Infallible;

    /// 未知の値は `Other` として扱う
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "email_connected" => ActivityType::EmailConnected,
            "subscription_added" => ActivityType::SubscriptionAdded,
            "subscription_updated" => ActivityType::SubscriptionUpdated,
            "subscription_deleted" => ActivityType::SubscriptionDeleted,
            "ai_analysis" => ActivityType::AiAnalysis,
            "recommendation_applied" => ActivityType::RecommendationApplied,
            "negotiation_created" => ActivityType::NegotiationCreated,
            "negotiation_message" => ActivityType::NegotiationMessage,
            "negotiation_rejected" => ActivityType::NegotiationRejected,
            "report_generated" => ActivityType::ReportGenerated,
            _ => ActivityType::Other,
        })
    }
}

/// アクティビティ（監査ログ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub activity_type: ActivityType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 付加情報（サーバーはJSON文字列で返す）
    #[serde(default, deserialize_with = "json_or_json_string")]
    pub meta_data: Option<serde_json::Value>,
    #[serde(with = "lenient_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "bool_from_int")]
    pub read: bool,
}

/// アクティビティ作成用DTO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub activity_type: ActivityType,
    pub title: String,
    pub description: Option<String>,
    pub meta_data: Option<serde_json::Value>,
}

impl NewActivity {
    pub fn new<S: Into<String>>(activity_type: ActivityType, title: S) -> Self {
        Self {
            activity_type,
            title: title.into(),
            description: None,
            meta_data: None,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_meta_data(mut self, meta_data: serde_json::Value) -> Self {
        self.meta_data = Some(meta_data);
        self
    }
}

/// 未読件数レスポンス
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: u64,
}

/// JSONオブジェクトとJSON文字列の両方を受け付ける
///
/// JSONとして解析できない文字列はそのまま文字列値として保持する
fn json_or_json_string<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(raw)) if raw.trim().is_empty() => None,
        Some(serde_json::Value::String(raw)) => {
            Some(serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_type_round_trip_through_str() {
        for activity_type in [
            ActivityType::EmailConnected,
            ActivityType::SubscriptionAdded,
            ActivityType::SubscriptionDeleted,
            ActivityType::RecommendationApplied,
            ActivityType::NegotiationCreated,
            ActivityType::ReportGenerated,
        ] {
            let parsed: ActivityType = activity_type.as_str().parse().unwrap();
            assert_eq!(parsed, activity_type);
        }
        assert_eq!("unknown_event".parse::<ActivityType>().unwrap(), ActivityType::Other);
    }

    #[test]
    fn test_deserialize_backend_activity() {
        let json = r#"{
            "id": "a-1",
            "user_id": "u-1",
            "activity_type": "negotiation_created",
            "title": "Negociação iniciada",
            "description": null,
            "meta_data": "{\"negotiation_id\": \"n-1\"}",
            "created_at": "2024-03-01T10:00:00.123456",
            "read": 0
        }"#;

        let activity: Activity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.activity_type, ActivityType::NegotiationCreated);
        assert!(!activity.read);
        assert_eq!(activity.meta_data.unwrap()["negotiation_id"], "n-1");
    }

    #[test]
    fn test_unknown_activity_type_and_plain_meta() {
        let json = r#"{
            "id": "a-2",
            "activity_type": "bank_connected",
            "title": "Bank",
            "meta_data": "not json",
            "created_at": "2024-03-01T10:00:00Z",
            "read": 1
        }"#;

        let activity: Activity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.activity_type, ActivityType::Other);
        assert!(activity.read);
        assert_eq!(activity.meta_data, Some(serde_json::json!("not json")));
    }
}
