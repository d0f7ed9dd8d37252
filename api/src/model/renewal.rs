use chrono::{DateTime, Utc};
use garde::Validate;
use kernel::model::id::{LoanId, RenewalRequestId, UserId};
use kernel::model::renewal::{RenewalRequest, RenewalStatus, ResolvedRenewal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestRenewalRequest {
    #[garde(skip)]
    pub user_id: UserId,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRenewalRequest {
    #[garde(skip)]
    pub approve: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalRequestsResponse {
    pub items: Vec<RenewalRequestResponse>,
}

impl From<Vec<RenewalRequest>> for RenewalRequestsResponse {
    fn from(value: Vec<RenewalRequest>) -> Self {
        Self {
            items: value.into_iter().map(RenewalRequestResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalRequestResponse {
    pub renewal_request_id: RenewalRequestId,
    pub loan_id: LoanId,
    pub requested_by: UserId,
    pub status: RenewalStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<RenewalRequest> for RenewalRequestResponse {
    fn from(value: RenewalRequest) -> Self {
        let RenewalRequest {
            renewal_request_id,
            loan_id,
            requested_by,
            status,
            requested_at,
            resolved_at,
        } = value;
        Self {
            renewal_request_id,
            loan_id,
            requested_by,
            status,
            requested_at,
            resolved_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRenewalResponse {
    pub renewal_request_id: RenewalRequestId,
    pub loan_id: LoanId,
    pub approved: bool,
    pub new_due_date: Option<DateTime<Utc>>,
}

impl From<ResolvedRenewal> for ResolvedRenewalResponse {
    fn from(value: ResolvedRenewal) -> Self {
        let ResolvedRenewal {
            renewal_request_id,
            loan_id,
            requested_by: _,
            approved,
            new_due_date,
        } = value;
        Self {
            renewal_request_id,
            loan_id,
            approved,
            new_due_date,
        }
    }
}
