//! 画面に表示中の交渉一覧
//!
//! サーバーから返った会話はビューが生きている場合のみ反映する。
//! 期限切れは表示時に判定し、保持している状態は書き換えない。

use super::api_commands::NegotiationApi;
use super::models::{Negotiation, NegotiationPatch, NegotiationStatus};
use super::state::{self as negotiation_state, NegotiationEvent};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::view_scope::ViewScope;
use chrono::{DateTime, Utc};

/// 交渉画面の状態
#[derive(Debug)]
pub struct NegotiationBoard {
    negotiations: Vec<Negotiation>,
    scope: ViewScope,
}

impl NegotiationBoard {
    pub fn new(scope: ViewScope) -> Self {
        Self {
            negotiations: Vec::new(),
            scope,
        }
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }

    /// 一覧を読み込み直す
    pub fn load(&mut self, negotiations: Vec<Negotiation>) -> bool {
        let target = &mut self.negotiations;
        self.scope
            .apply_if_active(|| *target = negotiations)
            .is_some()
    }

    /// 表示用の交渉（期限切れを反映済み）
    pub fn get(&self, id: &str) -> Option<Negotiation> {
        self.get_at(id, Utc::now())
    }

    pub fn get_at(&self, id: &str, now: DateTime<Utc>) -> Option<Negotiation> {
        self.negotiations
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.clone().presented(now))
    }

    /// 表示用の一覧（期限切れを反映済み）
    pub fn list(&self) -> Vec<Negotiation> {
        let now = Utc::now();
        self.negotiations
            .iter()
            .map(|n| n.clone().presented(now))
            .collect()
    }

    /// 交渉を追加、または同じIDのものを置き換える
    pub fn upsert(&mut self, negotiation: Negotiation) -> bool {
        let negotiations = &mut self.negotiations;
        self.scope
            .apply_if_active(|| {
                match negotiations.iter_mut().find(|n| n.id == negotiation.id) {
                    Some(existing) => *existing = negotiation,
                    None => negotiations.push(negotiation),
                }
            })
            .is_some()
    }

    /// 会話を丸ごと置き換える
    ///
    /// 差分に最終オファーがない場合は既存のオファーを残す
    ///
    /// # 戻り値
    /// 反映した場合はtrue（破棄済みのビュー、または未知のIDの場合はfalse）
    pub fn apply_patch(&mut self, id: &str, patch: NegotiationPatch) -> bool {
        let negotiations = &mut self.negotiations;
        self.scope
            .apply_if_active(|| {
                let Some(negotiation) = negotiations.iter_mut().find(|n| n.id == id) else {
                    return false;
                };
                negotiation.messages = patch.messages;
                if let Some(offer) = patch.final_offer {
                    negotiation.final_offer = Some(offer);
                }
                true
            })
            .unwrap_or(false)
    }

    pub fn set_status(&mut self, id: &str, status: NegotiationStatus) -> bool {
        let negotiations = &mut self.negotiations;
        self.scope
            .apply_if_active(|| {
                negotiations
                    .iter_mut()
                    .find(|n| n.id == id)
                    .map(|n| n.status = status)
                    .is_some()
            })
            .unwrap_or(false)
    }

    /// 表示中の交渉に操作を適用できるか確認する
    fn ensure_allowed(&self, id: &str, event: NegotiationEvent) -> AppResult<()> {
        let negotiation = self
            .negotiations
            .iter()
            .find(|n| n.id == id)
            .ok_or_else(|| AppError::NotFound(format!("ID {id} の交渉が表示されていません")))?;
        negotiation_state::apply(negotiation, event, Utc::now()).map(|_| ())
    }

    /// メッセージを送信し、返った会話を反映する
    ///
    /// 期限切れ・終了済みの交渉にはリクエストを送らない。
    /// ビューが破棄された場合はCancelledエラーとなり、一覧は変更されない
    pub async fn send_message(&mut self, api: &NegotiationApi, id: &str, text: &str) -> AppResult<()> {
        self.ensure_allowed(id, NegotiationEvent::SendMessage)?;

        let patch = self.scope.run(api.send_message(id, text)).await?;
        self.apply_patch(id, patch);
        Ok(())
    }

    /// 最終オファーを承諾し、表示中の状態を更新する
    pub async fn accept(&mut self, api: &NegotiationApi, id: &str) -> AppResult<()> {
        self.ensure_allowed(id, NegotiationEvent::Accept)?;

        self.scope.run(api.accept(id)).await?;
        self.set_status(id, NegotiationStatus::Accepted);
        Ok(())
    }

    pub async fn reject(&mut self, api: &NegotiationApi, id: &str) -> AppResult<()> {
        self.ensure_allowed(id, NegotiationEvent::Reject)?;

        self.scope.run(api.reject(id)).await?;
        self.set_status(id, NegotiationStatus::Rejected);
        Ok(())
    }
}
