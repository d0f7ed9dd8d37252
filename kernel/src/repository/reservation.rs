use crate::model::{
    id::{BookId, ReservationId},
    reservation::{event::CreateReservation, CanceledReservation, Reservation},
};
use async_trait::async_trait;
use shared::error::AppResult;

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    // 予約を作成する。在庫がある蔵書は予約できない（直接貸出を使う）
    async fn create(&self, event: CreateReservation) -> AppResult<ReservationId>;
    // 蔵書 ID に紐づく予約キューを先頭から順に取得する
    async fn find_by_book_id(&self, book_id: BookId) -> AppResult<Vec<Reservation>>;
    // 予約を取り消す。キャンセルのほか、確保期限切れの繰り上げにも使う
    async fn cancel(&self, reservation_id: ReservationId) -> AppResult<CanceledReservation>;
}
