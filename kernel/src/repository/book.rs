use crate::model::{
    book::{
        event::{CreateBook, DeleteBook, UpdateBook},
        Book, BookListOptions,
    },
    id::BookId,
    list::PaginatedList,
};
use async_trait::async_trait;
use shared::error::AppResult;

#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn create(&self, event: CreateBook) -> AppResult<BookId>;
    async fn find_all(&self, options: BookListOptions) -> AppResult<PaginatedList<Book>>;
    async fn find_by_id(&self, book_id: BookId) -> AppResult<Option<Book>>;
    async fn update(&self, event: UpdateBook) -> AppResult<()>;
    // 未返却の貸出が残っている蔵書は削除できない
    async fn delete(&self, event: DeleteBook) -> AppResult<()>;
}
