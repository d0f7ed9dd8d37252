use kernel::model::{
    id::{LoanId, RenewalRequestId, UserId},
    renewal::{RenewalRequest, RenewalStatus},
};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(FromRow)]
pub struct RenewalRequestRow {
    pub renewal_request_id: RenewalRequestId,
    pub loan_id: LoanId,
    pub user_id: UserId,
    pub status: RenewalStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<RenewalRequestRow> for RenewalRequest {
    fn from(value: RenewalRequestRow) -> Self {
        let RenewalRequestRow {
            renewal_request_id,
            loan_id,
            user_id,
            status,
            requested_at,
            resolved_at,
        } = value;
        RenewalRequest {
            renewal_request_id,
            loan_id,
            requested_by: user_id,
            status,
            requested_at,
            resolved_at,
        }
    }
}
