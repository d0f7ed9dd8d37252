use crate::model::loan::{CreateLoanRequest, LoanResponse, LoansResponse, ReturnedLoanResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use garde::Validate;
use kernel::model::{
    id::{BookId, LoanId, UserId},
    loan::event::{CreateLoan, ReturnLoan},
};
use kernel::notifier::NotificationKind;
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

pub async fn create_loan(
    Path(book_id): Path<BookId>,
    State(registry): State<AppRegistry>,
    Json(req): Json<CreateLoanRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate(&())?;

    let event = CreateLoan::new(book_id, req.user_id, chrono::Utc::now());
    let loan_id = registry.loan_repository().create(event).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "loanId": loan_id })),
    ))
}

pub async fn return_loan(
    Path((book_id, loan_id)): Path<(BookId, LoanId)>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<ReturnedLoanResponse>> {
    let event = ReturnLoan::new(loan_id, book_id, chrono::Utc::now());
    let returned = registry.loan_repository().return_loan(event).await?;

    // 返却で空いた蔵書は予約キューの先頭が引き継ぐ。確保期限のタイマーは
    // 通知ゲートウェイ側の責務なので、ここでは送信依頼だけを行い、
    // 送信の成否は返却処理に影響させない
    if let Some(next) = &returned.next_reservation {
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

    Ok(Json(returned.into()))
}

pub async fn show_loan_list(
    State(registry): State<AppRegistry>,
) -> AppResult<Json<LoansResponse>> {
    registry
        .loan_repository()
        .find_unreturned_all()
        .await
        .map(LoansResponse::from)
        .map(Json)
}

pub async fn show_loan(
    Path(loan_id): Path<LoanId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<LoanResponse>> {
    registry
        .loan_repository()
        .find_by_id(loan_id)
        .await
        .map(LoanResponse::from)
        .map(Json)
}

pub async fn show_user_loan_list(
    Path(user_id): Path<UserId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<LoansResponse>> {
    registry
        .loan_repository()
        .find_unreturned_by_user_id(user_id)
        .await
        .map(LoansResponse::from)
        .map(Json)
}

pub async fn show_loan_history(
    Path(book_id): Path<BookId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<LoansResponse>> {
    registry
        .loan_repository()
        .find_history_by_book_id(book_id)
        .await
        .map(LoansResponse::from)
        .map(Json)
}
