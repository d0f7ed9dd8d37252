use crate::model::{
    id::{BookId, ReservationId},
    user::ReservationUser,
};
use chrono::{DateTime, Utc};

pub mod event;

// 予約キューの1エントリ。position は reserved_at 昇順で導出され、先頭が 1
#[derive(Debug)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub book_id: BookId,
    pub reserved_by: ReservationUser,
    pub position: i64,
    pub reserved_at: DateTime<Utc>,
}

// 予約取り消し（キャンセルまたは確保期限切れ）の結果。
// 在庫があり、かつキューが残っている場合は次の先頭が入る
#[derive(Debug)]
pub struct CanceledReservation {
    pub book_id: BookId,
    pub next_reservation: Option<Reservation>,
}
