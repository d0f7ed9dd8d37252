use crate::model::reservation::{CreateReservationRequest, ReservationsResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use garde::Validate;
use kernel::model::{
    id::{BookId, ReservationId},
    reservation::event::CreateReservation,
};
use kernel::notifier::NotificationKind;
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

pub async fn reserve_book(
    Path(book_id): Path<BookId>,
    State(registry): State<AppRegistry>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate(&())?;

    let event = CreateReservation::new(book_id, req.user_id, chrono::Utc::now());
    let reservation_id = registry.reservation_repository().create(event).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "reservationId": reservation_id })),
    ))
}

pub async fn show_reservation_list(
    Path(book_id): Path<BookId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<ReservationsResponse>> {
    registry
        .reservation_repository()
        .find_by_book_id(book_id)
        .await
        .map(ReservationsResponse::from)
        .map(Json)
}

pub async fn cancel_reservation(
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
) -> AppResult<StatusCode> {
    let canceled = registry
        .reservation_repository()
        .cancel(reservation_id)
        .await?;

    // 在庫が確保されたままの取り消しなら、次の先頭に引き継ぎを通知する。
    // 確保期限切れで外部のタイマーがこの API を呼んだ場合もここを通る
    if let Some(next) = &canceled.next_reservation {
        let dispatcher = registry.notification_dispatcher();
        let user_id = next.reserved_by.user_id;
        let payload = serde_json::json!({
            "bookId": next.book_id,
            "reservationId": next.reservation_id,
        });
        tokio::spawn(async move {
            dispatcher
                .notify(user_id, NotificationKind::ReservationReady, payload)
                .await;
        });
    }

    Ok(StatusCode::OK)
}
