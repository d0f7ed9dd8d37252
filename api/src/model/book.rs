use derive_new::new;
use garde::Validate;
use kernel::model::book::{
    event::{CreateBook, UpdateBook},
    Book, BookListOptions, BookTag,
};
use kernel::model::id::BookId;
use kernel::model::list::PaginatedList;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookRequest {
    #[garde(length(min = 1))]
    pub title: String,
    #[garde(length(min = 1))]
    pub author: String,
    #[garde(length(min = 1))]
    pub isbn: String,
    #[garde(skip)]
    pub tag: BookTag,
    #[garde(range(min = 1))]
    pub total_copies: i32,
}

impl From<CreateBookRequest> for CreateBook {
    fn from(value: CreateBookRequest) -> Self {
        let CreateBookRequest {
            title,
            author,
            isbn,
            tag,
            total_copies,
        } = value;
        CreateBook {
            title,
            author,
            isbn,
            tag,
            total_copies,
        }
    }
}

// 蔵書データの更新用の型。指定のあった項目だけを書き換える
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookRequest {
    #[garde(inner(length(min = 1)))]
    pub title: Option<String>,
    #[garde(inner(length(min = 1)))]
    pub author: Option<String>,
    #[garde(inner(length(min = 1)))]
    pub isbn: Option<String>,
    #[garde(skip)]
    pub tag: Option<BookTag>,
}

#[derive(new)]
pub struct UpdateBookRequestWithId(BookId, UpdateBookRequest);

impl From<UpdateBookRequestWithId> for UpdateBook {
    fn from(value: UpdateBookRequestWithId) -> Self {
        let UpdateBookRequestWithId(
            book_id,
            UpdateBookRequest {
                title,
                author,
                isbn,
                tag,
            },
        ) = value;
        UpdateBook {
            book_id,
            title,
            author,
            isbn,
            tag,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookListQuery {
    #[garde(range(min = 0, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[garde(range(min = 0))]
    #[serde(default)]
    pub offset: i64,
}

const DEFAULT_LIMIT: i64 = 20;
const fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl From<BookListQuery> for BookListOptions {
    fn from(value: BookListQuery) -> Self {
        let BookListQuery { limit, offset } = value;
        BookListOptions { limit, offset }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookResponse {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub tag: BookTag,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl From<Book> for BookResponse {
    fn from(value: Book) -> Self {
        let Book {
            book_id,
            title,
            author,
            isbn,
            tag,
            total_copies,
            available_copies,
        } = value;
        Self {
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

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedBookResponse {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub items: Vec<BookResponse>,
}

impl From<PaginatedList<Book>> for PaginatedBookResponse {
    fn from(value: PaginatedList<Book>) -> Self {
        let PaginatedList {
            total,
            limit,
            offset,
            items,
        } = value;
        Self {
            total,
            limit,
            offset,
            items: items.into_iter().map(BookResponse::from).collect(),
        }
    }
}
