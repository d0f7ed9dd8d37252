use super::{
    book::build_book_routers, health::build_health_check_routers, loan::build_loan_routers,
    renewal::build_renewal_request_routers, reservation::build_reservation_routers,
    user::build_user_routers,
};
use axum::Router;
use registry::AppRegistry;

pub fn routes() -> Router<AppRegistry> {
    let router = Router::new()
        .merge(build_health_check_routers())
        .merge(build_book_routers())
        .merge(build_loan_routers())
        .merge(build_renewal_request_routers())
        .merge(build_reservation_routers())
        .merge(build_user_routers());
    Router::new().nest("/api/v1", router)
}
