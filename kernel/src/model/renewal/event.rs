use crate::model::id::{LoanId, RenewalRequestId, UserId};
use chrono::{DateTime, Utc};
use derive_new::new;

#[derive(new, Debug)]
pub struct RequestRenewal {
    pub loan_id: LoanId,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
}

#[derive(new, Debug)]
pub struct ResolveRenewal {
    pub renewal_request_id: RenewalRequestId,
    pub approve: bool,
    pub resolved_at: DateTime<Utc>,
}
