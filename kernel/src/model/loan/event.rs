use crate::model::id::{BookId, LoanId, UserId};
use chrono::{DateTime, Utc};
use derive_new::new;

#[derive(new, Debug)]
pub struct CreateLoan {
    pub book_id: BookId,
    pub loaned_by: UserId,
    pub loaned_at: DateTime<Utc>,
}

#[derive(new, Debug)]
pub struct ReturnLoan {
    pub loan_id: LoanId,
    pub book_id: BookId,
    pub returned_at: DateTime<Utc>,
}
