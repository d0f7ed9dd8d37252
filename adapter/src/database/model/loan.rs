use kernel::model::{
    book::{BookTag, LoanBook},
    id::{BookId, LoanId, UserId},
    loan::{Loan, LoanStatus, OverdueLoan},
    user::LoanUser,
};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::FromRow;

// 貸出一覧・履歴を取得する際に使う型。users と books を JOIN して埋める
#[derive(FromRow)]
pub struct LoanRow {
    pub loan_id: LoanId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub user_name: String,
    pub title: String,
    pub tag: BookTag,
    pub loaned_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub renewal_count: i32,
    pub fine: Option<i64>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl From<LoanRow> for Loan {
    fn from(value: LoanRow) -> Self {
        let LoanRow {
            loan_id,
            book_id,
            user_id,
            user_name,
            title,
            tag,
            loaned_at,
            due_date,
            status,
            renewal_count,
            fine,
            returned_at,
        } = value;
        Loan {
            loan_id,
            loaned_by: LoanUser { user_id, user_name },
            loaned_at,
            due_date,
            status,
            renewal_count,
            fine,
            returned_at,
            book: LoanBook {
                book_id,
                title,
                tag,
            },
        }
    }
}

// 期限切れスイープの UPDATE ... RETURNING で使う型
#[derive(FromRow)]
pub struct OverdueLoanRow {
    pub loan_id: LoanId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub title: String,
    pub due_date: DateTime<Utc>,
}

impl From<OverdueLoanRow> for OverdueLoan {
    fn from(value: OverdueLoanRow) -> Self {
        let OverdueLoanRow {
            loan_id,
            book_id,
            user_id,
            title,
            due_date,
        } = value;
        OverdueLoan {
            loan_id,
            loaned_by: user_id,
            book_id,
            book_title: title,
            due_date,
        }
    }
}
