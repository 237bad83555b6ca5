//! SQLiteの行からドメイン型へ変換するためのカラム補助関数

use crate::shared::utils::serde_compat::parse_timestamp;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use std::str::FromStr;

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// RFC 3339 文字列のカラムを取得する
pub fn get_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .ok_or_else(|| conversion_error(idx, format!("不正なタイムスタンプです: {raw}")))
}

/// NULL許容のタイムスタンプカラムを取得する
pub fn get_optional_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("不正なタイムスタンプです: {s}"))),
    }
}

/// 列挙型のカラムを取得する（`FromStr` で変換）
pub fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| conversion_error(idx, e.to_string()))
}

/// JSON文字列のカラムを取得する
pub fn get_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e.to_string()))
}

/// NULL許容のJSON文字列カラムを取得する
pub fn get_optional_json<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e.to_string())))
        .transpose()
}

/// タイムスタンプを保存用の文字列に変換する
///
/// 固定長（マイクロ秒・Z表記）で保存し、文字列比較で時刻順に並ぶようにする
pub fn to_db_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// NULL許容のタイムスタンプを保存用の文字列に変換する
pub fn to_db_optional_timestamp(value: Option<&DateTime<Utc>>) -> Option<String> {
    value.map(to_db_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rusqlite::Connection;

    #[test]
    fn test_column_helpers() {
        let conn = Connection::open_in_memory().unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();

        let (parsed, missing, list, none_json): (
            DateTime<Utc>,
            Option<DateTime<Utc>>,
            Vec<String>,
            Option<Vec<String>>,
        ) = conn
            .query_row(
                "SELECT ?1, NULL, ?2, NULL",
                [to_db_timestamp(&ts), r#"["a","b"]"#.to_string()],
                |row| {
                    Ok((
                        get_datetime(row, 0)?,
                        get_optional_datetime(row, 1)?,
                        get_json(row, 2)?,
                        get_optional_json(row, 3)?,
                    ))
                },
            )
            .unwrap();

        assert_eq!(parsed, ts);
        assert!(missing.is_none());
        assert_eq!(list, vec!["a".to_string(), "b".to_string()]);
        assert!(none_json.is_none());
    }

    #[test]
    fn test_db_timestamp_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let fractional = whole + chrono::Duration::milliseconds(5);

        assert_eq!(to_db_timestamp(&whole), "2024-05-01T12:30:00.000000Z");
        assert!(to_db_timestamp(&whole) < to_db_timestamp(&fractional));
        assert_eq!(to_db_timestamp(&whole).len(), to_db_timestamp(&fractional).len());
    }

    #[test]
    fn test_invalid_timestamp_column() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.query_row("SELECT 'garbage'", [], |row| get_datetime(row, 0));
        assert!(matches!(
            result,
            Err(rusqlite::Error::FromSqlConversionFailure(0, _, _))
        ));
    }
}
