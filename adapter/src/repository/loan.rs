use crate::database::{
    model::{
        loan::{LoanRow, OverdueLoanRow},
        reservation::ReservationRow,
    },
    ConnectionPool,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_new::new;
use kernel::model::book::BookTag;
use kernel::model::id::{BookId, LoanId, UserId};
use kernel::model::loan::{
    event::{CreateLoan, ReturnLoan},
    fine, Loan, LoanStatus, OverdueLoan, ReturnedLoan,
};
use kernel::model::reservation::Reservation;
use kernel::repository::loan::LoanRepository;
use shared::error::{AppError, AppResult};

#[derive(new)]
pub struct LoanRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl LoanRepository for LoanRepositoryImpl {
    // 貸出操作を行う
    async fn create(&self, event: CreateLoan) -> AppResult<LoanId> {
        let mut tx = self.db.begin().await?;

        // トランザクション分離レベルを SERIALIZABLE に設定する
        self.set_transaction_serializable(&mut tx).await?;

        // 事前のチェックとして、以下を調べる。
        // - 指定の蔵書 ID をもつ蔵書が存在し、貸出可能な在庫があるか
        // - 指定の利用者が存在するか
        // - 同じ利用者が同じ蔵書を借りたままになっていないか
        // - 予約キューが存在する場合、貸出希望者がその先頭か
        //
        // 上記のすべてが Yes だった場合、このブロック以降の処理に進む
        let tag = {
            let book_row = sqlx::query_as::<_, (BookTag, i32)>(
                r#"
                SELECT tag, available_copies
                FROM books
                WHERE book_id = $1
                "#,
            )
            .bind(event.book_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            let Some((tag, available_copies)) = book_row else {
                return Err(AppError::EntityNotFound(format!(
                    "蔵書（{}）が見つかりませんでした。",
                    event.book_id
                )));
            };

            let user_row = sqlx::query_scalar::<_, UserId>(
                r#"
                SELECT user_id
                FROM users
                WHERE user_id = $1
                "#,
            )
            .bind(event.loaned_by)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            if user_row.is_none() {
                return Err(AppError::EntityNotFound(format!(
                    "利用者（{}）が見つかりませんでした。",
                    event.loaned_by
                )));
            }

            if available_copies < 1 {
                return Err(AppError::ResourceConflict(format!(
                    "蔵書（{}）に貸出可能な在庫がありません。",
                    event.book_id
                )));
            }

            let unreturned = sqlx::query_scalar::<_, LoanId>(
                r#"
                SELECT loan_id
                FROM loans
                WHERE book_id = $1 AND user_id = $2 AND status <> 'returned'
                LIMIT 1
                "#,
            )
            .bind(event.book_id)
            .bind(event.loaned_by)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            if unreturned.is_some() {
                return Err(AppError::ResourceConflict(format!(
                    "蔵書（{}）はこの利用者に貸出中です。",
                    event.book_id
                )));
            }

            // 予約キューがある間、空き在庫は先頭の利用者のために確保される
            let head = sqlx::query_scalar::<_, UserId>(
                r#"
                SELECT user_id
                FROM reservations
                WHERE book_id = $1
                ORDER BY reserved_at ASC
                LIMIT 1
                "#,
            )
            .bind(event.book_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            if let Some(head) = head {
                if head != event.loaned_by {
                    return Err(AppError::ResourceConflict(format!(
                        "蔵書（{}）は予約待ちがあるため、予約キューの先頭の利用者のみ貸出できます。",
                        event.book_id
                    )));
                }
            }

            tag
        };

        // 在庫の減算は available_copies > 0 をガードにした原子更新で行い、
        // 0 を下回る更新をトランザクション内で拒否する
        let res = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies - 1
            WHERE book_id = $1 AND available_copies > 0
            "#,
        )
        .bind(event.book_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::ResourceConflict(format!(
                "蔵書（{}）に貸出可能な在庫がありません。",
                event.book_id
            )));
        }

        // 貸出処理を行う。返却期限は蔵書の貸出区分から決まる
        let loan_id = LoanId::new();
        let due_date = tag.loan_period().map(|period| event.loaned_at + period);
        let res = sqlx::query(
            r#"
            INSERT INTO loans (loan_id, book_id, user_id, loaned_at, due_date)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(loan_id)
        .bind(event.book_id)
        .bind(event.loaned_by)
        .bind(event.loaned_at)
        .bind(due_date)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No loan record has been created".into(),
            ));
        }

        // 予約キューの先頭だった場合は、貸出成立と同時に自分の予約を消化する
        sqlx::query(
            r#"
            DELETE FROM reservations
            WHERE book_id = $1 AND user_id = $2
            "#,
        )
        .bind(event.book_id)
        .bind(event.loaned_by)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        tx.commit().await.map_err(AppError::TransactionError)?;

        Ok(loan_id)
    }

    // 返却操作を行う
    async fn return_loan(&self, event: ReturnLoan) -> AppResult<ReturnedLoan> {
        let mut tx = self.db.begin().await?;

        // トランザクション分離レベルを SERIALIZABLE に設定する
        self.set_transaction_serializable(&mut tx).await?;

        // 返却操作時は事前のチェックとして、以下を調べる。
        // - 指定の貸出 ID をもつ貸出が存在し、指定の蔵書のものか
        // - まだ返却されていないか（returned は終端状態で、逆戻りさせない）
        let (due_date, tag) = {
            let row = sqlx::query_as::<_, (BookId, LoanStatus, Option<DateTime<Utc>>, BookTag)>(
                r#"
                SELECT l.book_id, l.status, l.due_date, b.tag
                FROM loans AS l
                INNER JOIN books AS b ON l.book_id = b.book_id
                WHERE l.loan_id = $1
                "#,
            )
            .bind(event.loan_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            let Some((book_id, status, due_date, tag)) = row else {
                return Err(AppError::EntityNotFound(format!(
                    "貸出（{}）が見つかりませんでした。",
                    event.loan_id
                )));
            };

            if book_id != event.book_id {
                return Err(AppError::EntityNotFound(format!(
                    "貸出（{}）が蔵書（{}）に存在しません。",
                    event.loan_id, event.book_id
                )));
            }

            if !status.can_transition_to(LoanStatus::Returned) {
                return Err(AppError::UnprocessableEntity(format!(
                    "貸出（{}）はすでに返却済みです。",
                    event.loan_id
                )));
            }

            (due_date, tag)
        };

        // 延滞金は返却時点で確定し、貸出レコードに記録する
        let fine = fine::compute_fine(tag, due_date, event.returned_at);

        let res = sqlx::query(
            r#"
            UPDATE loans
            SET status = 'returned', returned_at = $2, fine = $3
            WHERE loan_id = $1 AND status <> 'returned'
            "#,
        )
        .bind(event.loan_id)
        .bind(event.returned_at)
        .bind(fine)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No loan record has been returned".into(),
            ));
        }

        // 在庫の加算。total_copies を超える加算はトランザクション内で拒否する
        let res = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies + 1
            WHERE book_id = $1 AND available_copies < total_copies
            "#,
        )
        .bind(event.book_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "Available copies would exceed total copies".into(),
            ));
        }

        // 返却で空きが出たので、予約キューの先頭を引き継ぎ先として返す。
        // 通知の送信は呼び出し側の責務
        let next_reservation = self.find_queue_head(&mut tx, event.book_id).await?;

        tx.commit().await.map_err(AppError::TransactionError)?;

        Ok(ReturnedLoan {
            loan_id: event.loan_id,
            fine,
            next_reservation,
        })
    }

    // 返却期限を過ぎた active の貸出を overdue に遷移させる。
    // 条件に合うレコードだけを書き換える冪等な UPDATE なので、
    // スイープを多重実行しても安全
    async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<OverdueLoan>> {
        let rows = sqlx::query_as::<_, OverdueLoanRow>(
            r#"
            UPDATE loans
            SET status = 'overdue'
            FROM books
            WHERE loans.book_id = books.book_id
              AND loans.status = 'active'
              AND loans.due_date IS NOT NULL
              AND loans.due_date < $1
            RETURNING
                loans.loan_id,
                loans.book_id,
                loans.user_id,
                books.title,
                loans.due_date
            "#,
        )
        .bind(now)
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(rows.into_iter().map(OverdueLoan::from).collect())
    }

    // すべての未返却の貸出情報を取得する
    async fn find_unreturned_all(&self) -> AppResult<Vec<Loan>> {
        sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT
                l.loan_id,
                l.book_id,
                l.user_id,
                u.user_name,
                b.title,
                b.tag,
                l.loaned_at,
                l.due_date,
                l.status,
                l.renewal_count,
                l.fine,
                l.returned_at
            FROM loans AS l
            INNER JOIN books AS b ON l.book_id = b.book_id
            INNER JOIN users AS u ON l.user_id = u.user_id
            WHERE l.status <> 'returned'
            ORDER BY l.loaned_at ASC
            "#,
        )
        .fetch_all(self.db.inner_ref())
        .await
        .map(|rows| rows.into_iter().map(Loan::from).collect())
        .map_err(AppError::SpecificOperationError)
    }

    // 利用者 ID に紐づく未返却の貸出情報を取得する
    async fn find_unreturned_by_user_id(&self, user_id: UserId) -> AppResult<Vec<Loan>> {
        // find_unreturned_all の SQL に
        // 利用者 ID で絞り込む WHERE 句を追加したものである
        sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT
                l.loan_id,
                l.book_id,
                l.user_id,
                u.user_name,
                b.title,
                b.tag,
                l.loaned_at,
                l.due_date,
                l.status,
                l.renewal_count,
                l.fine,
                l.returned_at
            FROM loans AS l
            INNER JOIN books AS b ON l.book_id = b.book_id
            INNER JOIN users AS u ON l.user_id = u.user_id
            WHERE l.status <> 'returned' AND l.user_id = $1
            ORDER BY l.loaned_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.db.inner_ref())
        .await
        .map(|rows| rows.into_iter().map(Loan::from).collect())
        .map_err(AppError::SpecificOperationError)
    }

    // 蔵書の貸出履歴（返却済みも含む）を取得する
    async fn find_history_by_book_id(&self, book_id: BookId) -> AppResult<Vec<Loan>> {
        // 未返却の貸出と返却済みの貸出をそれぞれ取得し、
        // 未返却を先頭にした一覧として返す
        let mut history = self.find_unreturned_by_book_id(book_id).await?;

        let returned: Vec<Loan> = sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT
                l.loan_id,
                l.book_id,
                l.user_id,
                u.user_name,
                b.title,
                b.tag,
                l.loaned_at,
                l.due_date,
                l.status,
                l.renewal_count,
                l.fine,
                l.returned_at
            FROM loans AS l
            INNER JOIN books AS b ON l.book_id = b.book_id
            INNER JOIN users AS u ON l.user_id = u.user_id
            WHERE l.book_id = $1 AND l.status = 'returned'
            ORDER BY l.returned_at DESC
            "#,
        )
        .bind(book_id)
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?
        .into_iter()
        .map(Loan::from)
        .collect();

        history.extend(returned);

        Ok(history)
    }

    async fn find_by_id(&self, loan_id: LoanId) -> AppResult<Loan> {
        let row = sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT
                l.loan_id,
                l.book_id,
                l.user_id,
                u.user_name,
                b.title,
                b.tag,
                l.loaned_at,
                l.due_date,
                l.status,
                l.renewal_count,
                l.fine,
                l.returned_at
            FROM loans AS l
            INNER JOIN books AS b ON l.book_id = b.book_id
            INNER JOIN users AS u ON l.user_id = u.user_id
            WHERE l.loan_id = $1
            "#,
        )
        .bind(loan_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        match row {
            Some(row) => Ok(Loan::from(row)),
            None => Err(AppError::EntityNotFound(format!(
                "貸出（{}）が見つかりませんでした。",
                loan_id
            ))),
        }
    }
}

impl LoanRepositoryImpl {
    // create, return_loan メソッドでのトランザクションを利用するにあたり
    // トランザクション分離レベルを SERIALIZABLE にするために
    // 内部的に使うメソッド
    async fn set_transaction_serializable(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> AppResult<()> {
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut **tx)
            .await
            .map_err(AppError::SpecificOperationError)?;
        Ok(())
    }

    // 返却処理の中で予約キューの先頭を調べるために内部的に使うメソッド
    async fn find_queue_head(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        book_id: BookId,
    ) -> AppResult<Option<Reservation>> {
        let head = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT
                r.reservation_id,
                r.book_id,
                r.user_id,
                u.user_name,
                1::BIGINT AS position,
                r.reserved_at
            FROM reservations AS r
            INNER JOIN users AS u ON r.user_id = u.user_id
            WHERE r.book_id = $1
            ORDER BY r.reserved_at ASC
            LIMIT 1
            "#,
        )
        .bind(book_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(head.map(Reservation::from))
    }

    // find_history_by_book_id で未返却の貸出情報を取得するために
    // 内部的に使うメソッド
    async fn find_unreturned_by_book_id(&self, book_id: BookId) -> AppResult<Vec<Loan>> {
        sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT
                l.loan_id,
                l.book_id,
                l.user_id,
                u.user_name,
                b.title,
                b.tag,
                l.loaned_at,
                l.due_date,
                l.status,
                l.renewal_count,
                l.fine,
                l.returned_at
            FROM loans AS l
            INNER JOIN books AS b ON l.book_id = b.book_id
            INNER JOIN users AS u ON l.user_id = u.user_id
            WHERE l.book_id = $1 AND l.status <> 'returned'
            ORDER BY l.loaned_at ASC
            "#,
        )
        .bind(book_id)
        .fetch_all(self.db.inner_ref())
        .await
        .map(|rows| rows.into_iter().map(Loan::from).collect())
        .map_err(AppError::SpecificOperationError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{
        book::BookRepositoryImpl, reservation::ReservationRepositoryImpl, user::UserRepositoryImpl,
    };
    use chrono::{Duration, TimeZone};
    use kernel::model::book::event::CreateBook;
    use kernel::model::reservation::event::CreateReservation;
    use kernel::model::role::Role;
    use kernel::model::user::event::CreateUser;
    use kernel::repository::{
        book::BookRepository, reservation::ReservationRepository, user::UserRepository,
    };

    async fn register_user(repo: &UserRepositoryImpl, name: &str) -> anyhow::Result<UserId> {
        let user_id = repo
            .create(CreateUser {
                user_name: name.into(),
                email: format!("{name}@example.ac.jp"),
                role: Role::Member,
            })
            .await?;
        Ok(user_id)
    }

    async fn register_book(
        repo: &BookRepositoryImpl,
        tag: BookTag,
        total_copies: i32,
    ) -> anyhow::Result<BookId> {
        let book_id = repo
            .create(CreateBook {
                title: "Test Title".into(),
                author: "Test Author".into(),
                isbn: "978-4-0000-0000-0".into(),
                tag,
                total_copies,
            })
            .await?;
        Ok(book_id)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, day, hour, 0, 0).unwrap()
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn loan_consumes_stock_and_return_restores_it(
        pool: sqlx::PgPool,
    ) -> anyhow::Result<()> {
        let db = ConnectionPool::new(pool);
        let books = BookRepositoryImpl::new(db.clone());
        let users = UserRepositoryImpl::new(db.clone());
        let reservations = ReservationRepositoryImpl::new(db.clone());
        let repo = LoanRepositoryImpl::new(db.clone());

        let book_id = register_book(&books, BookTag::Yellow, 1).await?;
        let user_a = register_user(&users, "sato").await?;
        let user_b = register_user(&users, "suzuki").await?;

        let loan_id = repo
            .create(CreateLoan::new(book_id, user_a, at(1, 9)))
            .await?;

        let book = books.find_by_id(book_id).await?.unwrap();
        assert_eq!(book.available_copies, 0);

        let loan = repo.find_by_id(loan_id).await?;
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.renewal_count, 0);
        assert_eq!(loan.due_date, Some(at(1, 9) + Duration::days(5)));

        // 在庫が無いので2人目は借りられないが、予約はできる
        let res = repo.create(CreateLoan::new(book_id, user_b, at(1, 10))).await;
        assert!(matches!(res, Err(AppError::ResourceConflict(_))));
        reservations
            .create(CreateReservation::new(book_id, user_b, at(1, 10)))
            .await?;

        // 返却すると在庫がちょうど 1 増え、予約キューの先頭が引き継ぎ先になる
        let returned = repo
            .return_loan(ReturnLoan::new(loan_id, book_id, at(2, 9)))
            .await?;
        assert_eq!(returned.fine, 0);
        let next = returned.next_reservation.expect("head of the queue");
        assert_eq!(next.reserved_by.user_id, user_b);

        let book = books.find_by_id(book_id).await?.unwrap();
        assert_eq!(book.available_copies, 1);

        // 返却済みの貸出を再度返却することはできない
        let res = repo
            .return_loan(ReturnLoan::new(loan_id, book_id, at(2, 10)))
            .await;
        assert!(matches!(res, Err(AppError::UnprocessableEntity(_))));

        // 予約キューの先頭の利用者が借りると、予約が消化される
        repo.create(CreateLoan::new(book_id, user_b, at(2, 11)))
            .await?;
        assert!(reservations.find_by_book_id(book_id).await?.is_empty());

        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn held_stock_is_reserved_for_the_queue_head(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let db = ConnectionPool::new(pool);
        let books = BookRepositoryImpl::new(db.clone());
        let users = UserRepositoryImpl::new(db.clone());
        let reservations = ReservationRepositoryImpl::new(db.clone());
        let repo = LoanRepositoryImpl::new(db.clone());

        let book_id = register_book(&books, BookTag::Yellow, 1).await?;
        let user_a = register_user(&users, "sato").await?;
        let user_b = register_user(&users, "suzuki").await?;
        let user_c = register_user(&users, "takahashi").await?;

        let loan_id = repo
            .create(CreateLoan::new(book_id, user_a, at(1, 9)))
            .await?;
        reservations
            .create(CreateReservation::new(book_id, user_b, at(1, 10)))
            .await?;
        repo.return_loan(ReturnLoan::new(loan_id, book_id, at(2, 9)))
            .await?;

        // 空き在庫は予約キューの先頭（user_b）のために確保されている
        let res = repo.create(CreateLoan::new(book_id, user_c, at(2, 10))).await;
        assert!(matches!(res, Err(AppError::ResourceConflict(_))));

        repo.create(CreateLoan::new(book_id, user_b, at(2, 11)))
            .await?;

        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn overdue_sweep_and_fine_settlement(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let db = ConnectionPool::new(pool);
        let books = BookRepositoryImpl::new(db.clone());
        let users = UserRepositoryImpl::new(db.clone());
        let repo = LoanRepositoryImpl::new(db.clone());

        let book_id = register_book(&books, BookTag::Red, 1).await?;
        let user_id = register_user(&users, "sato").await?;

        // Red 区分の返却期限は翌日
        let loan_id = repo
            .create(CreateLoan::new(book_id, user_id, at(1, 9)))
            .await?;
        let due_date = at(2, 9);

        let newly_overdue = repo.mark_overdue(at(3, 0)).await?;
        assert_eq!(newly_overdue.len(), 1);
        assert_eq!(newly_overdue[0].loan_id, loan_id);
        assert_eq!(newly_overdue[0].due_date, due_date);

        // スイープは冪等で、2回目の実行では何も遷移しない
        let second_sweep = repo.mark_overdue(at(3, 1)).await?;
        assert!(second_sweep.is_empty());

        let loan = repo.find_by_id(loan_id).await?;
        assert_eq!(loan.status, LoanStatus::Overdue);

        // 3日遅れの返却。Red 区分の日額 × 3 が確定する
        let returned = repo
            .return_loan(ReturnLoan::new(loan_id, book_id, due_date + Duration::days(3)))
            .await?;
        assert_eq!(returned.fine, 3 * BookTag::Red.fine_per_day());

        let loan = repo.find_by_id(loan_id).await?;
        assert_eq!(loan.status, LoanStatus::Returned);
        assert_eq!(loan.fine, Some(returned.fine));

        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn white_tag_loans_have_no_due_date(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let db = ConnectionPool::new(pool);
        let books = BookRepositoryImpl::new(db.clone());
        let users = UserRepositoryImpl::new(db.clone());
        let repo = LoanRepositoryImpl::new(db.clone());

        let book_id = register_book(&books, BookTag::White, 1).await?;
        let user_id = register_user(&users, "sato").await?;

        let loan_id = repo
            .create(CreateLoan::new(book_id, user_id, at(1, 9)))
            .await?;
        let loan = repo.find_by_id(loan_id).await?;
        assert_eq!(loan.due_date, None);

        // 期限が無いのでスイープの対象にならず、延滞金も発生しない
        assert!(repo.mark_overdue(at(30, 0)).await?.is_empty());
        let returned = repo
            .return_loan(ReturnLoan::new(loan_id, book_id, at(30, 9)))
            .await?;
        assert_eq!(returned.fine, 0);

        Ok(())
    }
}
