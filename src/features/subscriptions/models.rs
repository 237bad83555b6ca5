use crate::shared::utils::serde_compat::{lenient_datetime, lenient_datetime_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 請求サイクル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Weekly => "weekly",
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Yearly => "yearly",
        }
    }

    /// 1サイクルあたりの金額を月額換算する
    ///
    /// 週額は年52週として換算する
    pub fn to_monthly(&self, amount_per_cycle: f64) -> f64 {
        match self {
            BillingCycle::Weekly => amount_per_cycle * 52.0 / 12.0,
            BillingCycle::Monthly => amount_per_cycle,
            BillingCycle::Quarterly => amount_per_cycle / 3.0,
            BillingCycle::Yearly => amount_per_cycle / 12.0,
        }
    }

    /// 月額換算の金額を1サイクルあたりの金額に戻す
    pub fn from_monthly(&self, monthly_amount: f64) -> f64 {
        match self {
            BillingCycle::Weekly => monthly_amount * 12.0 / 52.0,
            BillingCycle::Monthly => monthly_amount,
            BillingCycle::Quarterly => monthly_amount * 3.0,
            BillingCycle::Yearly => monthly_amount * 12.0,
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(BillingCycle::Weekly),
            "monthly" => Ok(BillingCycle::Monthly),
            "quarterly" => Ok(BillingCycle::Quarterly),
            "yearly" => Ok(BillingCycle::Yearly),
            other => Err(format!("不明な請求サイクルです: {other}")),
        }
    }
}

/// サブスクリプションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Cancelled,
    Paused,
    /// 無料体験中（月額合計には含めない）
    Trial,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Trial => "trial",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "paused" => Ok(SubscriptionStatus::Paused),
            "trial" => Ok(SubscriptionStatus::Trial),
            other => Err(format!("不明なサブスクリプション状態です: {other}")),
        }
    }
}

/// サブスクリプションの検出元
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Email,
    Bank,
    #[default]
    Manual,
    Api,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::Email => "email",
            DetectionSource::Bank => "bank",
            DetectionSource::Manual => "manual",
            DetectionSource::Api => "api",
        }
    }
}

impl FromStr for DetectionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(DetectionSource::Email),
            "bank" => Ok(DetectionSource::Bank),
            "manual" => Ok(DetectionSource::Manual),
            "api" => Ok(DetectionSource::Api),
            other => Err(format!("不明な検出元です: {other}")),
        }
    }
}

fn default_category() -> String {
    "other".to_string()
}

fn default_confidence() -> f64 {
    1.0
}

/// サブスクリプション
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub service_name: String,
    #[serde(default = "default_category")]
    pub service_category: String,
    #[serde(default)]
    pub plan_name: String,
    /// 1請求サイクルあたりの金額
    pub monthly_cost: f64,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    /// 未設定の場合は手動登録として扱う
    #[serde(default)]
    pub detection_source: Option<DetectionSource>,
    #[serde(default, with = "lenient_datetime_option")]
    pub last_used_date: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_datetime_option")]
    pub next_billing_date: Option<DateTime<Utc>>,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "lenient_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "lenient_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// 月額換算の料金
    pub fn normalized_monthly_cost(&self) -> f64 {
        self.billing_cycle.to_monthly(self.monthly_cost)
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

/// サブスクリプション作成用DTO
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSubscriptionDto {
    pub service_name: String,
    #[serde(default = "default_category")]
    pub service_category: String,
    #[serde(default)]
    pub plan_name: String,
    pub monthly_cost: f64,
    #[serde(default)]
    pub billing_cycle: BillingCycle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_source: Option<DetectionSource>,
    #[serde(
        default,
        with = "lenient_datetime_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_used_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "lenient_datetime_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_billing_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CreateSubscriptionDto {
    /// 必須項目のみを指定して作成する（その他は既定値）
    pub fn new<S: Into<String>>(service_name: S, monthly_cost: f64) -> Self {
        Self {
            service_name: service_name.into(),
            service_category: default_category(),
            monthly_cost,
            ..Default::default()
        }
    }
}

/// サブスクリプション更新用DTO（指定された項目のみ更新する）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSubscriptionDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_cycle: Option<BillingCycle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    #[serde(
        default,
        with = "lenient_datetime_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_used_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "lenient_datetime_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_billing_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl UpdateSubscriptionDto {
    /// 更新項目が1つもないかどうか
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none()
            && self.service_category.is_none()
            && self.plan_name.is_none()
            && self.monthly_cost.is_none()
            && self.billing_cycle.is_none()
            && self.status.is_none()
            && self.last_used_date.is_none()
            && self.next_billing_date.is_none()
            && self.confidence_score.is_none()
            && self.notes.is_none()
    }
}
