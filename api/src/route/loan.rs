use axum::{
    routing::{get, post},
    Router,
};
use registry::AppRegistry;

use crate::handler::loan::{show_loan, show_loan_list};
use crate::handler::renewal::request_renewal;

pub fn build_loan_routers() -> Router<AppRegistry> {
    let loans_routers = Router::new()
        .route("/", get(show_loan_list))
        .route("/:loan_id", get(show_loan))
        .route("/:loan_id/renewal-requests", post(request_renewal));

    Router::new().nest("/loans", loans_routers)
}
