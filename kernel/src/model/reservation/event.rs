use crate::model::id::{BookId, UserId};
use chrono::{DateTime, Utc};
use derive_new::new;

#[derive(new, Debug)]
pub struct CreateReservation {
    pub book_id: BookId,
    pub reserved_by: UserId,
    pub reserved_at: DateTime<Utc>,
}
