use crate::model::renewal::{
    RenewalRequestsResponse, RequestRenewalRequest, ResolveRenewalRequest,
    ResolvedRenewalResponse,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use garde::Validate;
use kernel::model::{
    id::{LoanId, RenewalRequestId},
    renewal::event::{RequestRenewal, ResolveRenewal},
};
use kernel::notifier::NotificationKind;
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

pub async fn request_renewal(
    Path(loan_id): Path<LoanId>,
    State(registry): State<AppRegistry>,
    Json(req): Json<RequestRenewalRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate(&())?;

    let event = RequestRenewal::new(loan_id, req.user_id, chrono::Utc::now());
    let renewal_request_id = registry.renewal_request_repository().create(event).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "renewalRequestId": renewal_request_id })),
    ))
}

pub async fn resolve_renewal(
    Path(renewal_request_id): Path<RenewalRequestId>,
    State(registry): State<AppRegistry>,
    Json(req): Json<ResolveRenewalRequest>,
) -> AppResult<Json<ResolvedRenewalResponse>> {
    req.validate(&())?;

    let event = ResolveRenewal::new(renewal_request_id, req.approve, chrono::Utc::now());
    let resolved = registry.renewal_request_repository().resolve(event).await?;

    // 申請者に結果を通知する。送信の成否は解決処理に影響させない
    let dispatcher = registry.notification_dispatcher();
    let user_id = resolved.requested_by;
    let payload = serde_json::json!({
        "loanId": resolved.loan_id,
        "approved": resolved.approved,
        "newDueDate": resolved.new_due_date,
    });
    tokio::spawn(async move {
        dispatcher
            .notify(user_id, NotificationKind::RenewalResolved, payload)
            .await;
    });

    Ok(Json(resolved.into()))
}

pub async fn show_pending_renewal_list(
    State(registry): State<AppRegistry>,
) -> AppResult<Json<RenewalRequestsResponse>> {
    registry
        .renewal_request_repository()
        .find_pending_all()
        .await
        .map(RenewalRequestsResponse::from)
        .map(Json)
}
