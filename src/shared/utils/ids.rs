use nanoid::nanoid;
use uuid::Uuid;

/// エンティティID（サブスクリプション・交渉など）を生成する
///
/// # 戻り値
/// UUID v4 のハイフン区切り文字列（APIサーバーと同じ形式）
pub fn generate_entity_id() -> String {
    Uuid::new_v4().to_string()
}

/// リクエストID用のnanoIdを生成する
///
/// # 戻り値
/// 21文字のURL-safeなnanoId
///
/// # 特性
/// - 文字セット: A-Za-z0-9_- (64文字)
/// - 長さ: 21文字
pub fn generate_request_id() -> String {
    nanoid!()
}

/// nanoIdが有効な形式かどうかを検証する
///
/// # 検証条件
/// - 長さが21文字
/// - URL-safe文字（A-Za-z0-9_-）のみを含む
pub fn is_valid_request_id(id: &str) -> bool {
    id.len() == 21
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
