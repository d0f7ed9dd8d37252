use chrono::{DateTime, Utc};
use garde::Validate;
use kernel::model::book::BookTag;
use kernel::model::id::{BookId, LoanId, UserId};
use kernel::model::loan::{Loan, LoanStatus, ReturnedLoan};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoanRequest {
    #[garde(skip)]
    pub user_id: UserId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoansResponse {
    pub items: Vec<LoanResponse>,
}

impl From<Vec<Loan>> for LoansResponse {
    fn from(value: Vec<Loan>) -> Self {
        Self {
            items: value.into_iter().map(LoanResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanResponse {
    pub loan_id: LoanId,
    pub loaned_by: LoanUserResponse,
    pub loaned_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub renewal_count: i32,
    pub fine: Option<i64>,
    pub returned_at: Option<DateTime<Utc>>,
    pub book: LoanBookResponse,
}

impl From<Loan> for LoanResponse {
    fn from(value: Loan) -> Self {
        let Loan {
            loan_id,
            loaned_by,
            loaned_at,
            due_date,
            status,
            renewal_count,
            fine,
            returned_at,
            book,
        } = value;
        Self {
            loan_id,
            loaned_by: LoanUserResponse {
                user_id: loaned_by.user_id,
                user_name: loaned_by.user_name,
            },
            loaned_at,
            due_date,
            status,
            renewal_count,
            fine,
            returned_at,
            book: LoanBookResponse {
                book_id: book.book_id,
                title: book.title,
                tag: book.tag,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanUserResponse {
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanBookResponse {
    pub book_id: BookId,
    pub title: String,
    pub tag: BookTag,
}

// 返却のレスポンス。延滞金は返却時点で確定した金額
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnedLoanResponse {
    pub loan_id: LoanId,
    pub fine: i64,
}

impl From<ReturnedLoan> for ReturnedLoanResponse {
    fn from(value: ReturnedLoan) -> Self {
        let ReturnedLoan { loan_id, fine, .. } = value;
        Self { loan_id, fine }
    }
}
