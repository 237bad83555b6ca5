use crate::shared::errors::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// エンティティ単位で処理中の変更操作を管理するレジストリ
///
/// 同じエンティティに対する2つ目の変更操作はキューに積まずに
/// `AppError::InFlight` で即座に拒否する。
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    keys: Arc<Mutex<HashSet<String>>>,
}

/// 処理中マーカー。ドロップ時にレジストリから解放される
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlightRegistry {
    /// 新しいレジストリを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// エンティティの処理中マーカーを取得する
    ///
    /// # 引数
    /// * `kind` - エンティティ種別（"recommendation" / "negotiation" など）
    /// * `id` - エンティティID
    ///
    /// # 戻り値
    /// 処理中マーカー、または同じエンティティが処理中の場合はInFlightエラー
    pub fn try_acquire(&self, kind: &str, id: &str) -> AppResult<InFlightGuard> {
        let key = format!("{kind}:{id}");
        let mut keys = lock(&self.keys);

        if !keys.insert(key.clone()) {
            log::warn!("処理中の操作があるため拒否しました: {key}");
            return Err(AppError::in_flight(key));
        }

        Ok(InFlightGuard {
            keys: Arc::clone(&self.keys),
            key,
        })
    }

    /// エンティティが処理中かどうかを判定する
    pub fn is_in_flight(&self, kind: &str, id: &str) -> bool {
        lock(&self.keys).contains(&format!("{kind}:{id}"))
    }
}

impl InFlightGuard {
    /// マーカーのキーを取得する
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.keys).remove(&self.key);
    }
}

// 保持中にパニックしても集合自体は壊れないため、毒状態は無視して使い続ける
fn lock(keys: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let registry = InFlightRegistry::new();

        let guard = registry.try_acquire("recommendation", "rec-1").unwrap();
        assert_eq!(guard.key(), "recommendation:rec-1");
        assert!(registry.is_in_flight("recommendation", "rec-1"));

        let second = registry.try_acquire("recommendation", "rec-1");
        assert!(matches!(second, Err(AppError::InFlight(_))));
    }

    #[test]
    fn test_guard_release_on_drop() {
        let registry = InFlightRegistry::new();

        {
            let _guard = registry.try_acquire("negotiation", "neg-1").unwrap();
        }

        assert!(!registry.is_in_flight("negotiation", "neg-1"));
        assert!(registry.try_acquire("negotiation", "neg-1").is_ok());
    }

    #[test]
    fn test_different_entities_do_not_conflict() {
        let registry = InFlightRegistry::new();

        let _a = registry.try_acquire("negotiation", "neg-1").unwrap();
        let _b = registry.try_acquire("negotiation", "neg-2").unwrap();
        let _c = registry.try_acquire("recommendation", "neg-1").unwrap();
    }

    #[test]
    fn test_clones_share_state() {
        let registry = InFlightRegistry::new();
        let cloned = registry.clone();

        let _guard = registry.try_acquire("recommendation", "rec-9").unwrap();
        assert!(cloned.try_acquire("recommendation", "rec-9").is_err());
    }
}
