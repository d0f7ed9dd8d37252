use chrono::{DateTime, Utc};
use garde::Validate;
use kernel::model::id::{BookId, ReservationId, UserId};
use kernel::model::reservation::Reservation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    #[garde(skip)]
    pub user_id: UserId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationsResponse {
    pub items: Vec<ReservationResponse>,
}

impl From<Vec<Reservation>> for ReservationsResponse {
    fn from(value: Vec<Reservation>) -> Self {
        Self {
            items: value.into_iter().map(ReservationResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub reservation_id: ReservationId,
    pub book_id: BookId,
    pub reserved_by: ReservationUserResponse,
    pub position: i64,
    pub reserved_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(value: Reservation) -> Self {
        let Reservation {
            reservation_id,
            book_id,
            reserved_by,
            position,
            reserved_at,
        } = value;
        Self {
            reservation_id,
            book_id,
            reserved_by: ReservationUserResponse {
                user_id: reserved_by.user_id,
                user_name: reserved_by.user_name,
            },
            position,
            reserved_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationUserResponse {
    pub user_id: UserId,
    pub user_name: String,
}
