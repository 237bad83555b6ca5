use crate::shared::utils::serde_compat::{lenient_datetime, lenient_datetime_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// メッセージの送信者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Provider,
}

/// 交渉メッセージ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(with = "lenient_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user<S: Into<String>>(content: S, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp,
        }
    }

    pub fn provider<S: Into<String>>(content: S, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: MessageRole::Provider,
            content: content.into(),
            timestamp,
        }
    }
}

/// 最終オファー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOffer {
    #[serde(default)]
    pub plan: String,
    /// オファー後の月額
    pub price: f64,
    /// 月額の節約額
    pub savings: f64,
    #[serde(default)]
    pub terms: String,
}

/// 交渉の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStatus {
    #[default]
    Active,
    Accepted,
    Rejected,
    Expired,
}

impl NegotiationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStatus::Active => "active",
            NegotiationStatus::Accepted => "accepted",
            NegotiationStatus::Rejected => "rejected",
            NegotiationStatus::Expired => "expired",
        }
    }

    /// 終端状態（これ以上遷移しない）かどうか
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NegotiationStatus::Active)
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NegotiationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(NegotiationStatus::Active),
            "accepted" => Ok(NegotiationStatus::Accepted),
            "rejected" => Ok(NegotiationStatus::Rejected),
            "expired" => Ok(NegotiationStatus::Expired),
            other => Err(format!("不明な交渉状態です: {other}")),
        }
    }
}

/// 交渉
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: String,
    #[serde(default)]
    pub optimization_id: Option<String>,
    pub subscription_id: String,
    pub provider_name: String,
    #[serde(default)]
    pub current_plan: String,
    #[serde(default)]
    pub proposed_savings: f64,
    /// 保存されている状態（期限切れは読み取り時に導出する）
    pub status: NegotiationStatus,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub final_offer: Option<FinalOffer>,
    #[serde(with = "lenient_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "lenient_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "lenient_datetime_option")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Negotiation {
    /// 指定時刻における実効状態
    ///
    /// 期限を過ぎた active の交渉は expired として扱う。保存値は書き換えない。
    pub fn effective_status(&self, now: DateTime<Utc>) -> NegotiationStatus {
        match (self.status, self.expires_at) {
            (NegotiationStatus::Active, Some(expires_at)) if expires_at <= now => {
                NegotiationStatus::Expired
            }
            (status, _) => status,
        }
    }

    /// 読み取り用に実効状態を反映したコピーを返す
    pub fn presented(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// 交渉作成用DTO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNegotiation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_id: Option<String>,
    pub subscription_id: String,
    pub provider_name: String,
    #[serde(default)]
    pub current_plan: String,
    #[serde(default)]
    pub proposed_savings: f64,
}

/// 返信者・サーバーから返される会話の差分
///
/// メッセージ列は全体を置き換える。最終オファーは提示された場合のみ置き換える。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationPatch {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub final_offer: Option<FinalOffer>,
}

/// 承諾APIのレスポンス
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AcceptResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub final_offer: Option<FinalOffer>,
}

/// 成否のみを返すAPIのレスポンス
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}
