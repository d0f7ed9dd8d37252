use crate::database::{model::book::BookRow, ConnectionPool};
use async_trait::async_trait;
use derive_new::new;
use kernel::model::book::{
    event::{CreateBook, DeleteBook, UpdateBook},
    Book, BookListOptions,
};
use kernel::model::id::{BookId, LoanId};
use kernel::model::list::PaginatedList;
use kernel::repository::book::BookRepository;
use shared::error::{AppError, AppResult};

#[derive(new)]
pub struct BookRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl BookRepository for BookRepositoryImpl {
    async fn create(&self, event: CreateBook) -> AppResult<BookId> {
        // 登録直後はすべての在庫が貸出可能
        let book_id = BookId::new();
        let res = sqlx::query(
            r#"
            INSERT INTO books (book_id, title, author, isbn, tag, total_copies, available_copies)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(book_id)
        .bind(event.title)
        .bind(event.author)
        .bind(event.isbn)
        .bind(event.tag)
        .bind(event.total_copies)
        .execute(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No book record has been created".into(),
            ));
        }

        Ok(book_id)
    }

    async fn find_all(&self, options: BookListOptions) -> AppResult<PaginatedList<Book>> {
        let BookListOptions { limit, offset } = options;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books")
            .fetch_one(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;

        let rows = sqlx::query_as::<_, BookRow>(
            r#"
            SELECT
                book_id,
                title,
                author,
                isbn,
                tag,
                total_copies,
                available_copies
            FROM books
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(PaginatedList {
            total,
            limit,
            offset,
            items: rows.into_iter().map(Book::from).collect(),
        })
    }

    async fn find_by_id(&self, book_id: BookId) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>(
            r#"
            SELECT
                book_id,
                title,
                author,
                isbn,
                tag,
                total_copies,
                available_copies
            FROM books
            WHERE book_id = $1
            "#,
        )
        .bind(book_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(row.map(Book::from))
    }

    async fn update(&self, event: UpdateBook) -> AppResult<()> {
        // 指定のあった項目だけを書き換える。在庫数はこのメソッドでは扱わず、
        // 貸出・返却操作だけが増減させる
        let res = sqlx::query(
            r#"
            UPDATE books
            SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                isbn = COALESCE($4, isbn),
                tag = COALESCE($5, tag)
            WHERE book_id = $1
            "#,
        )
        .bind(event.book_id)
        .bind(event.title)
        .bind(event.author)
        .bind(event.isbn)
        .bind(event.tag)
        .execute(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::EntityNotFound(format!(
                "蔵書（{}）が見つかりませんでした。",
                event.book_id
            )));
        }

        Ok(())
    }

    async fn delete(&self, event: DeleteBook) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        // 未返却の貸出が残っている蔵書は削除できない
        let unreturned = sqlx::query_scalar::<_, LoanId>(
            r#"
            SELECT loan_id
            FROM loans
            WHERE book_id = $1 AND status <> 'returned'
            LIMIT 1
            "#,
        )
        .bind(event.book_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if unreturned.is_some() {
            return Err(AppError::ResourceConflict(format!(
                "蔵書（{}）には未返却の貸出があるため削除できません。",
                event.book_id
            )));
        }

        let res = sqlx::query("DELETE FROM books WHERE book_id = $1")
            .bind(event.book_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::EntityNotFound(format!(
                "蔵書（{}）が見つかりませんでした。",
                event.book_id
            )));
        }

        tx.commit().await.map_err(AppError::TransactionError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::model::book::BookTag;

    #[sqlx::test(migrations = "../migrations")]
    async fn test_register_book(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = BookRepositoryImpl::new(ConnectionPool::new(pool));

        let book_id = repo
            .create(CreateBook {
                title: "Test Title".into(),
                author: "Test Author".into(),
                isbn: "978-4-0000-0000-0".into(),
                tag: BookTag::Yellow,
                total_copies: 3,
            })
            .await?;

        let options = BookListOptions {
            limit: 20,
            offset: 0,
        };
        let res = repo.find_all(options).await?;
        assert_eq!(res.total, 1);
        assert_eq!(res.items.len(), 1);

        let res = repo.find_by_id(book_id).await?;
        assert!(res.is_some());

        let Book {
            book_id: id,
            title,
            author,
            isbn,
            tag,
            total_copies,
            available_copies,
        } = res.unwrap();
        assert_eq!(id, book_id);
        assert_eq!(title, "Test Title");
        assert_eq!(author, "Test Author");
        assert_eq!(isbn, "978-4-0000-0000-0");
        assert_eq!(tag, BookTag::Yellow);
        assert_eq!(total_copies, 3);
        assert_eq!(available_copies, 3);

        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_update_and_delete_book(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = BookRepositoryImpl::new(ConnectionPool::new(pool));

        let book_id = repo
            .create(CreateBook {
                title: "Test Title".into(),
                author: "Test Author".into(),
                isbn: "978-4-0000-0000-0".into(),
                tag: BookTag::White,
                total_copies: 1,
            })
            .await?;

        repo.update(UpdateBook {
            book_id,
            title: Some("Updated Title".into()),
            author: None,
            isbn: None,
            tag: Some(BookTag::Red),
        })
        .await?;

        let book = repo.find_by_id(book_id).await?.unwrap();
        assert_eq!(book.title, "Updated Title");
        assert_eq!(book.author, "Test Author");
        assert_eq!(book.tag, BookTag::Red);

        repo.delete(DeleteBook { book_id }).await?;
        assert!(repo.find_by_id(book_id).await?.is_none());

        Ok(())
    }
}
