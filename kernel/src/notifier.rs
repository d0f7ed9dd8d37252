use crate::model::id::UserId;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

// 通知の種別。ゲートウェイ側で SMS / メールのテンプレートに対応づけられる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    ReservationReady,
    LoanOverdue,
    RenewalResolved,
}

// 外部の通知ゲートウェイへの送信依頼。best-effort であり、
// 失敗は実装側がログに残すだけでリトライしない
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, user_id: UserId, kind: NotificationKind, payload: Value);
}
