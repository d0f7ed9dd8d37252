use axum::{
    routing::{delete, get, post, put},
    Router,
};
use registry::AppRegistry;

use crate::handler::book::{delete_book, register_book, show_book, show_book_list, update_book};
use crate::handler::loan::{create_loan, return_loan, show_loan_history};
use crate::handler::reservation::{reserve_book, show_reservation_list};

pub fn build_book_routers() -> Router<AppRegistry> {
    let books_routers = Router::new()
        .route("/", post(register_book))
        .route("/", get(show_book_list))
        .route("/:book_id", get(show_book))
        .route("/:book_id", put(update_book))
        .route("/:book_id", delete(delete_book))
        .route("/:book_id/loans", post(create_loan))
        .route("/:book_id/loans", get(show_loan_history))
        .route("/:book_id/loans/:loan_id/returned", put(return_loan))
        .route("/:book_id/reservations", post(reserve_book))
        .route("/:book_id/reservations", get(show_reservation_list));

    Router::new().nest("/books", books_routers)
}
