use kernel::model::{
    id::{BookId, ReservationId, UserId},
    reservation::Reservation,
    user::ReservationUser,
};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::FromRow;

// 予約キューを取得する際に使う型。position は reserved_at 昇順の連番
#[derive(FromRow)]
pub struct ReservationRow {
    pub reservation_id: ReservationId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub user_name: String,
    pub position: i64,
    pub reserved_at: DateTime<Utc>,
}

impl From<ReservationRow> for Reservation {
    fn from(value: ReservationRow) -> Self {
        let ReservationRow {
            reservation_id,
            book_id,
            user_id,
            user_name,
            position,
            reserved_at,
        } = value;
        Reservation {
            reservation_id,
            book_id,
            reserved_by: ReservationUser { user_id, user_name },
            position,
            reserved_at,
        }
    }
}
