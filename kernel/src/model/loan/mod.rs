use crate::model::{
    book::LoanBook,
    id::{BookId, LoanId, UserId},
    reservation::Reservation,
    user::LoanUser,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod event;
pub mod fine;

// 貸出1件あたりの延長回数の上限
pub const RENEWAL_LIMIT: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

impl LoanStatus {
    // 許可する状態遷移の一覧。ここに無い遷移はすべて拒否する
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Active, Overdue) | (Active, Returned) | (Overdue, Returned)
        )
    }

    pub fn is_unreturned(self) -> bool {
        !matches!(self, LoanStatus::Returned)
    }
}

#[derive(Debug)]
pub struct Loan {
    pub loan_id: LoanId,
    pub loaned_by: LoanUser,
    pub loaned_at: DateTime<Utc>,
    // White 区分（館内利用）の貸出は返却期限を持たない
    pub due_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub renewal_count: i32,
    pub fine: Option<i64>,
    pub returned_at: Option<DateTime<Utc>>,
    pub book: LoanBook,
}

// 返却処理の結果。延滞金は返却時点で確定する
#[derive(Debug)]
pub struct ReturnedLoan {
    pub loan_id: LoanId,
    pub fine: i64,
    // 返却で空いた蔵書を待っている予約キューの先頭
    pub next_reservation: Option<Reservation>,
}

// 期限切れスイープで新たに overdue になった貸出
#[derive(Debug)]
pub struct OverdueLoan {
    pub loan_id: LoanId,
    pub loaned_by: UserId,
    pub book_id: BookId,
    pub book_title: String,
    pub due_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_status_transitions() {
        assert!(LoanStatus::Active.can_transition_to(LoanStatus::Overdue));
        assert!(LoanStatus::Active.can_transition_to(LoanStatus::Returned));
        assert!(LoanStatus::Overdue.can_transition_to(LoanStatus::Returned));
    }

    #[test]
    fn status_never_moves_backwards() {
        assert!(!LoanStatus::Overdue.can_transition_to(LoanStatus::Active));
        assert!(!LoanStatus::Returned.can_transition_to(LoanStatus::Active));
        assert!(!LoanStatus::Returned.can_transition_to(LoanStatus::Overdue));
        assert!(!LoanStatus::Active.can_transition_to(LoanStatus::Active));
    }

    #[test]
    fn returned_is_terminal() {
        for next in [
            LoanStatus::Active,
            LoanStatus::Overdue,
            LoanStatus::Returned,
        ] {
            assert!(!LoanStatus::Returned.can_transition_to(next));
        }
    }
}
