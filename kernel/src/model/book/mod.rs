use crate::model::id::BookId;
use chrono::Duration;
use serde::{Deserialize, Serialize};

pub mod event;

// 蔵書の貸出区分。返却期限と延滞金の日額を決める
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "book_tag", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookTag {
    White,
    Yellow,
    Red,
}

impl BookTag {
    // 貸出期間。White は館内利用扱いで返却期限を設けない
    pub fn loan_period(&self) -> Option<Duration> {
        match self {
            BookTag::White => None,
            BookTag::Yellow => Some(Duration::days(5)),
            BookTag::Red => Some(Duration::days(1)),
        }
    }

    // 延滞金の日額。短期貸出の Red がもっとも高い
    pub fn fine_per_day(&self) -> i64 {
        match self {
            BookTag::White => 0,
            BookTag::Yellow => 50,
            BookTag::Red => 100,
        }
    }
}

#[derive(Debug)]
pub struct Book {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub tag: BookTag,
    pub total_copies: i32,
    pub available_copies: i32,
}

// 貸出・予約のデータに埋め込む蔵書の要約
#[derive(Debug)]
pub struct LoanBook {
    pub book_id: BookId,
    pub title: String,
    pub tag: BookTag,
}

#[derive(Debug)]
pub struct BookListOptions {
    pub limit: i64,
    pub offset: i64,
}
