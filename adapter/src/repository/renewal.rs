use crate::database::{model::renewal::RenewalRequestRow, ConnectionPool};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_new::new;
use kernel::model::book::BookTag;
use kernel::model::id::{BookId, LoanId, RenewalRequestId, ReservationId, UserId};
use kernel::model::loan::{LoanStatus, RENEWAL_LIMIT};
use kernel::model::renewal::{
    event::{RequestRenewal, ResolveRenewal},
    RenewalRequest, RenewalStatus, ResolvedRenewal,
};
use kernel::repository::renewal::RenewalRequestRepository;
use shared::error::{AppError, AppResult};

#[derive(new)]
pub struct RenewalRequestRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl RenewalRequestRepository for RenewalRequestRepositoryImpl {
    // 延長申請を作成する
    async fn create(&self, event: RequestRenewal) -> AppResult<RenewalRequestId> {
        let mut tx = self.db.begin().await?;

        // トランザクション分離レベルを SERIALIZABLE に設定する
        self.set_transaction_serializable(&mut tx).await?;

        // 事前のチェックとして、以下を調べる。
        // - 指定の貸出が存在し、申請者本人のものか
        // - 未返却で、返却期限を持つ貸出か
        // - 延長回数が上限に達していないか
        // - 同じ貸出に対する申請中の延長申請が無いか
        {
            let row = sqlx::query_as::<_, (UserId, LoanStatus, Option<DateTime<Utc>>, i32)>(
                r#"
                SELECT user_id, status, due_date, renewal_count
                FROM loans
                WHERE loan_id = $1
                "#,
            )
            .bind(event.loan_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            let Some((loaned_by, status, due_date, renewal_count)) = row else {
                return Err(AppError::EntityNotFound(format!(
                    "貸出（{}）が見つかりませんでした。",
                    event.loan_id
                )));
            };

            if loaned_by != event.requested_by {
                return Err(AppError::UnprocessableEntity(format!(
                    "貸出（{}）は申請者本人のものではありません。",
                    event.loan_id
                )));
            }

            if !status.is_unreturned() {
                return Err(AppError::UnprocessableEntity(format!(
                    "貸出（{}）はすでに返却済みのため延長できません。",
                    event.loan_id
                )));
            }

            if due_date.is_none() {
                return Err(AppError::UnprocessableEntity(format!(
                    "貸出（{}）は返却期限が無いため延長できません。",
                    event.loan_id
                )));
            }

            if renewal_count >= RENEWAL_LIMIT {
                return Err(AppError::ResourceConflict(format!(
                    "貸出（{}）は延長回数の上限（{}回）に達しています。",
                    event.loan_id, RENEWAL_LIMIT
                )));
            }

            let pending = sqlx::query_scalar::<_, RenewalRequestId>(
                r#"
                SELECT renewal_request_id
                FROM renewal_requests
                WHERE loan_id = $1 AND status = 'pending'
                LIMIT 1
                "#,
            )
            .bind(event.loan_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            if pending.is_some() {
                return Err(AppError::ResourceConflict(format!(
                    "貸出（{}）には申請中の延長申請があります。",
                    event.loan_id
                )));
            }
        }

        let renewal_request_id = RenewalRequestId::new();
        let res = sqlx::query(
            r#"
            INSERT INTO renewal_requests (renewal_request_id, loan_id, user_id, requested_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(renewal_request_id)
        .bind(event.loan_id)
        .bind(event.requested_by)
        .bind(event.requested_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No renewal request record has been created".into(),
            ));
        }

        tx.commit().await.map_err(AppError::TransactionError)?;

        Ok(renewal_request_id)
    }

    // 申請を承認または却下する
    async fn resolve(&self, event: ResolveRenewal) -> AppResult<ResolvedRenewal> {
        let mut tx = self.db.begin().await?;

        // トランザクション分離レベルを SERIALIZABLE に設定する
        self.set_transaction_serializable(&mut tx).await?;

        let row = sqlx::query_as::<
            _,
            (
                LoanId,
                UserId,
                RenewalStatus,
                BookId,
                LoanStatus,
                Option<DateTime<Utc>>,
                i32,
                BookTag,
            ),
        >(
            r#"
            SELECT
                rr.loan_id,
                rr.user_id,
                rr.status,
                l.book_id,
                l.status AS loan_status,
                l.due_date,
                l.renewal_count,
                b.tag
            FROM renewal_requests AS rr
            INNER JOIN loans AS l ON rr.loan_id = l.loan_id
            INNER JOIN books AS b ON l.book_id = b.book_id
            WHERE rr.renewal_request_id = $1
            "#,
        )
        .bind(event.renewal_request_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        let Some((loan_id, requested_by, status, book_id, loan_status, due_date, renewal_count, tag)) =
            row
        else {
            return Err(AppError::EntityNotFound(format!(
                "延長申請（{}）が見つかりませんでした。",
                event.renewal_request_id
            )));
        };

        // pending 以外は処理済みで、遷移表に無い再解決は拒否する
        let next = if event.approve {
            RenewalStatus::Approved
        } else {
            RenewalStatus::Denied
        };
        if !status.can_transition_to(next) {
            return Err(AppError::UnprocessableEntity(format!(
                "延長申請（{}）はすでに処理済みです。",
                event.renewal_request_id
            )));
        }

        // 却下は無条件で終端に落とす
        if !event.approve {
            self.update_request_status(&mut tx, event.renewal_request_id, next, event.resolved_at)
                .await?;
            tx.commit().await.map_err(AppError::TransactionError)?;
            return Ok(ResolvedRenewal {
                renewal_request_id: event.renewal_request_id,
                loan_id,
                requested_by,
                approved: false,
                new_due_date: None,
            });
        }

        // 承認時のチェックは申請時ではなく解決時点の状態に対して行う。
        // 特に予約キューは、申請後に並んだ予約も承認を妨げる
        {
            let reservation = sqlx::query_scalar::<_, ReservationId>(
                r#"
                SELECT reservation_id
                FROM reservations
                WHERE book_id = $1
                LIMIT 1
                "#,
            )
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            // 予約待ちがいる場合、承認は保留のままブロックする（自動却下はしない）
            if reservation.is_some() {
                return Err(AppError::ResourceConflict(format!(
                    "蔵書（{}）に予約待ちがあるため、延長を承認できません。",
                    book_id
                )));
            }

            if !loan_status.is_unreturned() {
                return Err(AppError::UnprocessableEntity(format!(
                    "貸出（{}）はすでに返却済みのため延長できません。",
                    loan_id
                )));
            }

            if renewal_count >= RENEWAL_LIMIT {
                return Err(AppError::ResourceConflict(format!(
                    "貸出（{}）は延長回数の上限（{}回）に達しています。",
                    loan_id, RENEWAL_LIMIT
                )));
            }
        }

        let due_date = due_date.ok_or_else(|| {
            AppError::UnprocessableEntity(format!(
                "貸出（{}）は返却期限が無いため延長できません。",
                loan_id
            ))
        })?;
        let period = tag.loan_period().ok_or_else(|| {
            AppError::UnprocessableEntity(format!(
                "蔵書（{}）の貸出区分は延長できません。",
                book_id
            ))
        })?;
        let new_due_date = due_date + period;

        let res = sqlx::query(
            r#"
            UPDATE loans
            SET due_date = $2, renewal_count = renewal_count + 1
            WHERE loan_id = $1 AND renewal_count < $3
            "#,
        )
        .bind(loan_id)
        .bind(new_due_date)
        .bind(RENEWAL_LIMIT)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No loan record has been renewed".into(),
            ));
        }

        self.update_request_status(&mut tx, event.renewal_request_id, next, event.resolved_at)
            .await?;

        tx.commit().await.map_err(AppError::TransactionError)?;

        Ok(ResolvedRenewal {
            renewal_request_id: event.renewal_request_id,
            loan_id,
            requested_by,
            approved: true,
            new_due_date: Some(new_due_date),
        })
    }

    // 申請中の延長申請を申請日の古い順に取得する
    async fn find_pending_all(&self) -> AppResult<Vec<RenewalRequest>> {
        sqlx::query_as::<_, RenewalRequestRow>(
            r#"
            SELECT
                renewal_request_id,
                loan_id,
                user_id,
                status,
                requested_at,
                resolved_at
            FROM renewal_requests
            WHERE status = 'pending'
            ORDER BY requested_at ASC
            "#,
        )
        .fetch_all(self.db.inner_ref())
        .await
        .map(|rows| rows.into_iter().map(RenewalRequest::from).collect())
        .map_err(AppError::SpecificOperationError)
    }

    async fn find_by_id(
        &self,
        renewal_request_id: RenewalRequestId,
    ) -> AppResult<RenewalRequest> {
        let row = sqlx::query_as::<_, RenewalRequestRow>(
            r#"
            SELECT
                renewal_request_id,
                loan_id,
                user_id,
                status,
                requested_at,
                resolved_at
            FROM renewal_requests
            WHERE renewal_request_id = $1
            "#,
        )
        .bind(renewal_request_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        match row {
            Some(row) => Ok(RenewalRequest::from(row)),
            None => Err(AppError::EntityNotFound(format!(
                "延長申請（{}）が見つかりませんでした。",
                renewal_request_id
            ))),
        }
    }
}

impl RenewalRequestRepositoryImpl {
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

    // 申請レコードを終端状態に更新するために内部的に使うメソッド
    async fn update_request_status(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        renewal_request_id: RenewalRequestId,
        next: RenewalStatus,
        resolved_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE renewal_requests
            SET status = $2, resolved_at = $3
            WHERE renewal_request_id = $1 AND status = 'pending'
            "#,
        )
        .bind(renewal_request_id)
        .bind(next)
        .bind(resolved_at)
        .execute(&mut **tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No renewal request record has been resolved".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{
        book::BookRepositoryImpl, loan::LoanRepositoryImpl,
        reservation::ReservationRepositoryImpl, user::UserRepositoryImpl,
    };
    use chrono::{Duration, TimeZone};
    use kernel::model::book::event::CreateBook;
    use kernel::model::loan::event::CreateLoan;
    use kernel::model::reservation::event::CreateReservation;
    use kernel::model::role::Role;
    use kernel::model::user::event::CreateUser;
    use kernel::repository::{
        book::BookRepository, loan::LoanRepository, reservation::ReservationRepository,
        user::UserRepository,
    };

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, day, hour, 0, 0).unwrap()
    }

    struct Fixture {
        books: BookRepositoryImpl,
        users: UserRepositoryImpl,
        loans: LoanRepositoryImpl,
        reservations: ReservationRepositoryImpl,
        repo: RenewalRequestRepositoryImpl,
    }

    impl Fixture {
        fn new(pool: sqlx::PgPool) -> Self {
            let db = ConnectionPool::new(pool);
            Self {
                books: BookRepositoryImpl::new(db.clone()),
                users: UserRepositoryImpl::new(db.clone()),
                loans: LoanRepositoryImpl::new(db.clone()),
                reservations: ReservationRepositoryImpl::new(db.clone()),
                repo: RenewalRequestRepositoryImpl::new(db),
            }
        }

        async fn loaned_book(
            &self,
            tag: BookTag,
            total_copies: i32,
        ) -> anyhow::Result<(BookId, UserId, LoanId)> {
            let book_id = self
                .books
                .create(CreateBook {
                    title: "Test Title".into(),
                    author: "Test Author".into(),
                    isbn: "978-4-0000-0000-0".into(),
                    tag,
                    total_copies,
                })
                .await?;
            let user_id = self
                .users
                .create(CreateUser {
                    user_name: "sato".into(),
                    email: "sato@example.ac.jp".into(),
                    role: Role::Member,
                })
                .await?;
            let loan_id = self
                .loans
                .create(CreateLoan::new(book_id, user_id, at(1, 9)))
                .await?;
            Ok((book_id, user_id, loan_id))
        }
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn approval_extends_due_date_by_the_tag_period(
        pool: sqlx::PgPool,
    ) -> anyhow::Result<()> {
        let fx = Fixture::new(pool);
        let (_, user_id, loan_id) = fx.loaned_book(BookTag::Yellow, 1).await?;

        let request_id = fx
            .repo
            .create(RequestRenewal::new(loan_id, user_id, at(2, 9)))
            .await?;
        let resolved = fx
            .repo
            .resolve(ResolveRenewal::new(request_id, true, at(2, 10)))
            .await?;

        // Yellow 区分なので返却期限が 5 日延び、延長回数が 1 になる
        assert!(resolved.approved);
        assert_eq!(
            resolved.new_due_date,
            Some(at(1, 9) + Duration::days(5) + Duration::days(5))
        );
        let loan = fx.loans.find_by_id(loan_id).await?;
        assert_eq!(loan.renewal_count, 1);
        assert_eq!(loan.due_date, resolved.new_due_date);

        let request = fx.repo.find_by_id(request_id).await?;
        assert_eq!(request.status, RenewalStatus::Approved);

        // 処理済みの申請を再度解決することはできない
        let res = fx
            .repo
            .resolve(ResolveRenewal::new(request_id, false, at(2, 11)))
            .await;
        assert!(matches!(res, Err(AppError::UnprocessableEntity(_))));

        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn renewal_count_is_capped_at_the_limit(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let fx = Fixture::new(pool);
        let (_, user_id, loan_id) = fx.loaned_book(BookTag::Yellow, 1).await?;

        for i in 0..RENEWAL_LIMIT {
            let request_id = fx
                .repo
                .create(RequestRenewal::new(loan_id, user_id, at(2, 9 + i as u32)))
                .await?;
            fx.repo
                .resolve(ResolveRenewal::new(request_id, true, at(2, 10 + i as u32)))
                .await?;
        }

        let loan = fx.loans.find_by_id(loan_id).await?;
        assert_eq!(loan.renewal_count, RENEWAL_LIMIT);

        // 3回目の申請は常に拒否される
        let res = fx
            .repo
            .create(RequestRenewal::new(loan_id, user_id, at(3, 9)))
            .await;
        assert!(matches!(res, Err(AppError::ResourceConflict(_))));

        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn duplicate_pending_request_is_rejected(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let fx = Fixture::new(pool);
        let (_, user_id, loan_id) = fx.loaned_book(BookTag::Yellow, 1).await?;

        fx.repo
            .create(RequestRenewal::new(loan_id, user_id, at(2, 9)))
            .await?;
        let res = fx
            .repo
            .create(RequestRenewal::new(loan_id, user_id, at(2, 10)))
            .await;
        assert!(matches!(res, Err(AppError::ResourceConflict(_))));

        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn approval_is_blocked_while_the_queue_is_non_empty(
        pool: sqlx::PgPool,
    ) -> anyhow::Result<()> {
        let fx = Fixture::new(pool);
        let (book_id, user_id, loan_id) = fx.loaned_book(BookTag::Yellow, 1).await?;
        let waiting_user = fx
            .users
            .create(CreateUser {
                user_name: "suzuki".into(),
                email: "suzuki@example.ac.jp".into(),
                role: Role::Member,
            })
            .await?;

        let request_id = fx
            .repo
            .create(RequestRenewal::new(loan_id, user_id, at(2, 9)))
            .await?;

        // 申請よりも後に並んだ予約でも、解決時点で存在すれば承認を妨げる
        fx.reservations
            .create(CreateReservation::new(book_id, waiting_user, at(2, 10)))
            .await?;

        let res = fx
            .repo
            .resolve(ResolveRenewal::new(request_id, true, at(2, 11)))
            .await;
        assert!(matches!(res, Err(AppError::ResourceConflict(_))));

        // 承認がブロックされても申請は保留のままで、自動的に却下されない
        let request = fx.repo.find_by_id(request_id).await?;
        assert_eq!(request.status, RenewalStatus::Pending);

        // 予約が取り消されれば承認できる
        let queue = fx.reservations.find_by_book_id(book_id).await?;
        fx.reservations.cancel(queue[0].reservation_id).await?;
        let resolved = fx
            .repo
            .resolve(ResolveRenewal::new(request_id, true, at(2, 12)))
            .await?;
        assert!(resolved.approved);

        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn denial_is_terminal_and_skips_queue_checks(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let fx = Fixture::new(pool);
        let (_, user_id, loan_id) = fx.loaned_book(BookTag::Yellow, 1).await?;

        let request_id = fx
            .repo
            .create(RequestRenewal::new(loan_id, user_id, at(2, 9)))
            .await?;
        let resolved = fx
            .repo
            .resolve(ResolveRenewal::new(request_id, false, at(2, 10)))
            .await?;
        assert!(!resolved.approved);
        assert_eq!(resolved.new_due_date, None);

        let loan = fx.loans.find_by_id(loan_id).await?;
        assert_eq!(loan.renewal_count, 0);
        assert_eq!(loan.due_date, Some(at(1, 9) + Duration::days(5)));

        let request = fx.repo.find_by_id(request_id).await?;
        assert_eq!(request.status, RenewalStatus::Denied);

        Ok(())
    }
}
