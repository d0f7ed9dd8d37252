use crate::model::id::{LoanId, RenewalRequestId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "renewal_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RenewalStatus {
    Pending,
    Approved,
    Denied,
}

impl RenewalStatus {
    // pending からのみ approved / denied に遷移でき、どちらも終端
    pub fn can_transition_to(self, next: RenewalStatus) -> bool {
        use RenewalStatus::*;
        matches!((self, next), (Pending, Approved) | (Pending, Denied))
    }
}

#[derive(Debug)]
pub struct RenewalRequest {
    pub renewal_request_id: RenewalRequestId,
    pub loan_id: LoanId,
    pub requested_by: UserId,
    pub status: RenewalStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// 解決処理の結果。承認時のみ新しい返却期限が入る
#[derive(Debug)]
pub struct ResolvedRenewal {
    pub renewal_request_id: RenewalRequestId,
    pub loan_id: LoanId,
    pub requested_by: UserId,
    pub approved: bool,
    pub new_due_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_resolves_both_ways() {
        assert!(RenewalStatus::Pending.can_transition_to(RenewalStatus::Approved));
        assert!(RenewalStatus::Pending.can_transition_to(RenewalStatus::Denied));
    }

    #[test]
    fn resolved_states_are_terminal() {
        for from in [RenewalStatus::Approved, RenewalStatus::Denied] {
            for next in [
                RenewalStatus::Pending,
                RenewalStatus::Approved,
                RenewalStatus::Denied,
            ] {
                assert!(!from.can_transition_to(next));
            }
        }
    }
}
