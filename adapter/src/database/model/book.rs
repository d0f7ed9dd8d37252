use kernel::model::{
    book::{Book, BookTag},
    id::BookId,
};
use sqlx::FromRow;

#[derive(FromRow)]
pub struct BookRow {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub tag: BookTag,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl From<BookRow> for Book {
    fn from(value: BookRow) -> Self {
        let BookRow {
            book_id,
            title,
            author,
            isbn,
            tag,
            total_copies,
            available_copies,
        } = value;
        Book {
            book_id,
            title,
            author,
            isbn,
            tag,
            total_copies,
            available_copies,
        }
    }
}
