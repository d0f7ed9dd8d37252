use crate::model::{
    id::{BookId, LoanId, UserId},
    loan::{
        event::{CreateLoan, ReturnLoan},
        Loan, OverdueLoan, ReturnedLoan,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::error::AppResult;

#[async_trait]
pub trait LoanRepository: Send + Sync {
    // 貸出操作を行う。在庫の減算と貸出レコードの挿入は同一トランザクション
    async fn create(&self, event: CreateLoan) -> AppResult<LoanId>;
    // 返却操作を行う。延滞金の確定と在庫の加算、予約キュー先頭の検出まで行う
    async fn return_loan(&self, event: ReturnLoan) -> AppResult<ReturnedLoan>;
    // 返却期限を過ぎた active の貸出を overdue に遷移させる。冪等
    async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<OverdueLoan>>;
    // すべての未返却の貸出を取得する
    async fn find_unreturned_all(&self) -> AppResult<Vec<Loan>>;
    // ユーザー ID に紐づく未返却の貸出を取得する
    async fn find_unreturned_by_user_id(&self, user_id: UserId) -> AppResult<Vec<Loan>>;
    // 蔵書の貸出履歴（返却済みも含む）を取得する
    async fn find_history_by_book_id(&self, book_id: BookId) -> AppResult<Vec<Loan>>;
    async fn find_by_id(&self, loan_id: LoanId) -> AppResult<Loan>;
}
