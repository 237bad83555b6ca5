pub mod ids;
pub mod serde_compat;

use crate::shared::errors::{AppError, AppResult};

/// 金額の上限（10桁以内）
const MAX_AMOUNT: f64 = 10_000_000_000.0;

/// 文字列の長さバリデーション
///
/// # 引数
/// * `text` - 検証対象の文字列
/// * `max_length` - 最大文字数
/// * `field_name` - フィールド名（エラーメッセージ用）
///
/// # 戻り値
/// 有効な長さの場合はOk(())、無効な場合はエラー
pub fn validate_text_length(text: &str, max_length: usize, field_name: &str) -> AppResult<()> {
    let char_count = text.chars().count();
    if char_count > max_length {
        return Err(AppError::validation(format!(
            "{field_name}は{max_length}文字以内で入力してください（現在: {char_count}文字）"
        )));
    }
    Ok(())
}

/// 必須フィールドのバリデーション
///
/// # 引数
/// * `text` - 検証対象の文字列
/// * `field_name` - フィールド名（エラーメッセージ用）
///
/// # 戻り値
/// 空でない場合はOk(())、空または空白のみの場合はエラー
pub fn validate_required_field(text: &str, field_name: &str) -> AppResult<()> {
    if text.trim().is_empty() {
        return Err(AppError::validation(format!("{field_name}は必須項目です")));
    }
    Ok(())
}

/// 料金のバリデーション
///
/// # バリデーション規則
/// - 0以上の数値であること（無料プランを許可する）
/// - 有限値であること
/// - 10桁以内であること
pub fn validate_cost(amount: f64, field_name: &str) -> AppResult<()> {
    if !amount.is_finite() {
        return Err(AppError::validation(format!("{field_name}が無効な数値です")));
    }

    if amount < 0.0 {
        return Err(AppError::validation(format!(
            "{field_name}は0以上の数値である必要があります"
        )));
    }

    if amount >= MAX_AMOUNT {
        return Err(AppError::validation(format!(
            "{field_name}は10桁以内で入力してください"
        )));
    }

    Ok(())
}

/// 信頼度スコアのバリデーション（0〜1）
pub fn validate_score(score: f64, field_name: &str) -> AppResult<()> {
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(AppError::validation(format!(
            "{field_name}は0から1の範囲である必要があります"
        )));
    }
    Ok(())
}

/// 金額を小数点以下2桁に丸める
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// 割合（%）を計算する
///
/// 分母が0以下または非有限値の場合は0を返す（NaNを返さない）
pub fn percentage_of(part: f64, total: f64) -> f64 {
    if !total.is_finite() || total <= 0.0 || !part.is_finite() {
        return 0.0;
    }
    part / total * 100.0
}

/// 文字列の正規化（前後の空白を削除）
pub fn normalize_string(text: &str) -> String {
    text.trim().to_string()
}

/// 金額を表示用にフォーマット（小数点以下2桁）
pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", round_currency(amount))
}
