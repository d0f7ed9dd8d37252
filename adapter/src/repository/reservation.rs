use crate::database::{model::reservation::ReservationRow, ConnectionPool};
use async_trait::async_trait;
use derive_new::new;
use kernel::model::id::{BookId, ReservationId, UserId};
use kernel::model::reservation::{
    event::CreateReservation, CanceledReservation, Reservation,
};
use kernel::repository::reservation::ReservationRepository;
use shared::error::{AppError, AppResult};

#[derive(new)]
pub struct ReservationRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl ReservationRepository for ReservationRepositoryImpl {
    // 予約操作を行う
    async fn create(&self, event: CreateReservation) -> AppResult<ReservationId> {
        let mut tx = self.db.begin().await?;

        // トランザクション分離レベルを SERIALIZABLE に設定する
        self.set_transaction_serializable(&mut tx).await?;

        // 事前のチェックとして、以下を調べる。
        // - 指定の蔵書 ID をもつ蔵書が存在するか
        // - 指定の利用者が存在するか
        // - 貸出可能な在庫が無いか（在庫があるなら直接貸出を使う。
        //   ただし在庫が予約キューの先頭のために確保されている間は、
        //   他の利用者がキューに並ぶことを許す）
        // - 同じ利用者の予約がすでに並んでいないか
        {
            let available = sqlx::query_scalar::<_, i32>(
                r#"
                SELECT available_copies
                FROM books
                WHERE book_id = $1
                "#,
            )
            .bind(event.book_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            let Some(available_copies) = available else {
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
            .bind(event.reserved_by)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            if user_row.is_none() {
                return Err(AppError::EntityNotFound(format!(
                    "利用者（{}）が見つかりませんでした。",
                    event.reserved_by
                )));
            }

            let queue_len = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM reservations
                WHERE book_id = $1
                "#,
            )
            .bind(event.book_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            if available_copies > 0 && queue_len == 0 {
                return Err(AppError::UnprocessableEntity(format!(
                    "蔵書（{}）は貸出可能な在庫があるため予約できません。直接貸出を利用してください。",
                    event.book_id
                )));
            }

            let queued = sqlx::query_scalar::<_, ReservationId>(
                r#"
                SELECT reservation_id
                FROM reservations
                WHERE book_id = $1 AND user_id = $2
                "#,
            )
            .bind(event.book_id)
            .bind(event.reserved_by)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            if queued.is_some() {
                return Err(AppError::ResourceConflict(format!(
                    "蔵書（{}）はすでに予約済みです。",
                    event.book_id
                )));
            }
        }

        // 予約処理を行う。キューの順序は reserved_at の昇順で決まる
        let reservation_id = ReservationId::new();
        let res = sqlx::query(
            r#"
            INSERT INTO reservations (reservation_id, book_id, user_id, reserved_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(reservation_id)
        .bind(event.book_id)
        .bind(event.reserved_by)
        .bind(event.reserved_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No reservation record has been created".into(),
            ));
        }

        tx.commit().await.map_err(AppError::TransactionError)?;

        Ok(reservation_id)
    }

    // 蔵書 ID に紐づく予約キューを先頭から順に取得する
    async fn find_by_book_id(&self, book_id: BookId) -> AppResult<Vec<Reservation>> {
        sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT
                r.reservation_id,
                r.book_id,
                r.user_id,
                u.user_name,
                ROW_NUMBER() OVER (ORDER BY r.reserved_at ASC) AS position,
                r.reserved_at
            FROM reservations AS r
            INNER JOIN users AS u ON r.user_id = u.user_id
            WHERE r.book_id = $1
            ORDER BY r.reserved_at ASC
            "#,
        )
        .bind(book_id)
        .fetch_all(self.db.inner_ref())
        .await
        .map(|rows| rows.into_iter().map(Reservation::from).collect())
        .map_err(AppError::SpecificOperationError)
    }

    // 予約終了操作を行う。利用者自身のキャンセルのほか、
    // 確保期限切れの際に外部のタイマーが呼ぶ繰り上げにも使う
    async fn cancel(&self, reservation_id: ReservationId) -> AppResult<CanceledReservation> {
        let mut tx = self.db.begin().await?;

        // トランザクション分離レベルを SERIALIZABLE に設定する
        self.set_transaction_serializable(&mut tx).await?;

        let book_id = {
            let row = sqlx::query_scalar::<_, BookId>(
                r#"
                SELECT book_id
                FROM reservations
                WHERE reservation_id = $1
                "#,
            )
            .bind(reservation_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

            let Some(book_id) = row else {
                return Err(AppError::EntityNotFound(format!(
                    "予約（{}）が見つかりませんでした。",
                    reservation_id
                )));
            };

            book_id
        };

        let res = sqlx::query(
            r#"
            DELETE FROM reservations WHERE reservation_id = $1
            "#,
        )
        .bind(reservation_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No reservation record has been deleted".into(),
            ));
        }

        // 在庫が確保されたまま取り消された場合は、次の先頭へ繰り上げる。
        // 在庫が無ければ引き継ぎ先は無く、次の返却時に改めて先頭が通知される
        let available = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT available_copies
            FROM books
            WHERE book_id = $1
            "#,
        )
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        let next_reservation = if available > 0 {
            sqlx::query_as::<_, ReservationRow>(
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
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?
            .map(Reservation::from)
        } else {
            None
        };

        tx.commit().await.map_err(AppError::TransactionError)?;

        Ok(CanceledReservation {
            book_id,
            next_reservation,
        })
    }
}

impl ReservationRepositoryImpl {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{
        book::BookRepositoryImpl, loan::LoanRepositoryImpl, user::UserRepositoryImpl,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use kernel::model::book::{event::CreateBook, BookTag};
    use kernel::model::loan::event::{CreateLoan, ReturnLoan};
    use kernel::model::role::Role;
    use kernel::model::user::event::CreateUser;
    use kernel::repository::{book::BookRepository, loan::LoanRepository, user::UserRepository};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, day, hour, 0, 0).unwrap()
    }

    async fn register_user(repo: &UserRepositoryImpl, name: &str) -> anyhow::Result<
        kernel::model::id::UserId,
    > {
        let user_id = repo
            .create(CreateUser {
                user_name: name.into(),
                email: format!("{name}@example.ac.jp"),
                role: Role::Member,
            })
            .await?;
        Ok(user_id)
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn reservation_requires_exhausted_stock(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let db = ConnectionPool::new(pool);
        let books = BookRepositoryImpl::new(db.clone());
        let users = UserRepositoryImpl::new(db.clone());
        let loans = LoanRepositoryImpl::new(db.clone());
        let repo = ReservationRepositoryImpl::new(db.clone());

        let book_id = books
            .create(CreateBook {
                title: "Test Title".into(),
                author: "Test Author".into(),
                isbn: "978-4-0000-0000-0".into(),
                tag: BookTag::Yellow,
                total_copies: 1,
            })
            .await?;
        let user_a = register_user(&users, "sato").await?;
        let user_b = register_user(&users, "suzuki").await?;

        // 在庫がある間は予約できない
        let res = repo
            .create(CreateReservation::new(book_id, user_b, at(1, 9)))
            .await;
        assert!(matches!(res, Err(AppError::UnprocessableEntity(_))));

        loans
            .create(CreateLoan::new(book_id, user_a, at(1, 10)))
            .await?;
        repo.create(CreateReservation::new(book_id, user_b, at(1, 11)))
            .await?;

        // 同じ利用者は同じ蔵書に二重に並べない
        let res = repo
            .create(CreateReservation::new(book_id, user_b, at(1, 12)))
            .await;
        assert!(matches!(res, Err(AppError::ResourceConflict(_))));

        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn queue_is_served_in_fifo_order(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let db = ConnectionPool::new(pool);
        let books = BookRepositoryImpl::new(db.clone());
        let users = UserRepositoryImpl::new(db.clone());
        let loans = LoanRepositoryImpl::new(db.clone());
        let repo = ReservationRepositoryImpl::new(db.clone());

        let book_id = books
            .create(CreateBook {
                title: "Test Title".into(),
                author: "Test Author".into(),
                isbn: "978-4-0000-0000-0".into(),
                tag: BookTag::Yellow,
                total_copies: 1,
            })
            .await?;
        let user_a = register_user(&users, "sato").await?;
        let user_b = register_user(&users, "suzuki").await?;
        let user_c = register_user(&users, "takahashi").await?;

        let loan_id = loans
            .create(CreateLoan::new(book_id, user_a, at(1, 9)))
            .await?;
        repo.create(CreateReservation::new(book_id, user_b, at(1, 10)))
            .await?;
        repo.create(CreateReservation::new(book_id, user_c, at(1, 11)))
            .await?;

        let queue = repo.find_by_book_id(book_id).await?;
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].reserved_by.user_id, user_b);
        assert_eq!(queue[0].position, 1);
        assert_eq!(queue[1].reserved_by.user_id, user_c);
        assert_eq!(queue[1].position, 2);

        // 返却後に先頭が外れると、確保された在庫は次の先頭（user_c）に移る
        loans
            .return_loan(ReturnLoan::new(loan_id, book_id, at(2, 9)))
            .await?;
        let canceled = repo.cancel(queue[0].reservation_id).await?;
        let next = canceled.next_reservation.expect("next head of the queue");
        assert_eq!(next.reserved_by.user_id, user_c);

        // 最後の一人が外れたら引き継ぎ先は無い
        let canceled = repo.cancel(next.reservation_id).await?;
        assert!(canceled.next_reservation.is_none());

        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn cancel_without_stock_promotes_nobody(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let db = ConnectionPool::new(pool);
        let books = BookRepositoryImpl::new(db.clone());
        let users = UserRepositoryImpl::new(db.clone());
        let loans = LoanRepositoryImpl::new(db.clone());
        let repo = ReservationRepositoryImpl::new(db.clone());

        let book_id = books
            .create(CreateBook {
                title: "Test Title".into(),
                author: "Test Author".into(),
                isbn: "978-4-0000-0000-0".into(),
                tag: BookTag::Yellow,
                total_copies: 1,
            })
            .await?;
        let user_a = register_user(&users, "sato").await?;
        let user_b = register_user(&users, "suzuki").await?;
        let user_c = register_user(&users, "takahashi").await?;

        loans
            .create(CreateLoan::new(book_id, user_a, at(1, 9)))
            .await?;
        repo.create(CreateReservation::new(book_id, user_b, at(1, 10)))
            .await?;
        repo.create(CreateReservation::new(book_id, user_c, at(1, 11)))
            .await?;

        // 在庫が無い間の取り消しでは誰も繰り上げ通知されない
        let queue = repo.find_by_book_id(book_id).await?;
        let canceled = repo.cancel(queue[0].reservation_id).await?;
        assert!(canceled.next_reservation.is_none());

        Ok(())
    }
}
