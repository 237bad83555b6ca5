//! APIサーバーが返す値の揺れを吸収するためのシリアライズ補助
//!
//! サーバーはタイムゾーンなしのISO-8601（UTCとして扱う）や日付のみの文字列を返すことがあり、
//! 既読フラグは 0/1 の整数で返す。

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// タイムスタンプ文字列を解析する
///
/// # 対応形式
/// - RFC 3339（`2024-03-01T10:00:00Z`, `2024-03-01T10:00:00-03:00`）
/// - タイムゾーンなしISO-8601（`2024-03-01T10:00:00.123456`、UTCとして扱う）
/// - 空白区切り（`2024-03-01 10:00:00`、UTCとして扱う）
/// - 日付のみ（`2024-03-01`、UTCの0時として扱う）
///
/// # 戻り値
/// 解析できた場合はUTC時刻、できない場合はNone
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// 必須タイムスタンプ用の (de)serialize 実装
pub mod lenient_datetime {
    use super::*;

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("不正なタイムスタンプです: {raw}")))
    }
}

/// 任意タイムスタンプ用の (de)serialize 実装
///
/// null と空文字列は None として扱う
pub mod lenient_datetime_option {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse_timestamp(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("不正なタイムスタンプです: {s}"))),
        }
    }
}

/// 真偽値または 0/1 の整数を受け付けるデシリアライザ
pub fn bool_from_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrInt {
        Bool(bool),
        Int(i64),
    }

    match BoolOrInt::deserialize(deserializer)? {
        BoolOrInt::Bool(b) => Ok(b),
        BoolOrInt::Int(i) => Ok(i != 0),
    }
}
