use crate::model::{
    id::RenewalRequestId,
    renewal::{
        event::{RequestRenewal, ResolveRenewal},
        RenewalRequest, ResolvedRenewal,
    },
};
use async_trait::async_trait;
use shared::error::AppResult;

#[async_trait]
pub trait RenewalRequestRepository: Send + Sync {
    // 延長申請を作成する。上限到達・申請中の重複は拒否する
    async fn create(&self, event: RequestRenewal) -> AppResult<RenewalRequestId>;
    // 申請を承認または却下する。承認時は解決時点の予約キューを確認する
    async fn resolve(&self, event: ResolveRenewal) -> AppResult<ResolvedRenewal>;
    // 未処理の申請一覧を取得する
    async fn find_pending_all(&self) -> AppResult<Vec<RenewalRequest>>;
    async fn find_by_id(&self, renewal_request_id: RenewalRequestId)
        -> AppResult<RenewalRequest>;
}
