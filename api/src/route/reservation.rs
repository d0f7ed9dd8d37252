use axum::{routing::delete, Router};
use registry::AppRegistry;

use crate::handler::reservation::cancel_reservation;

pub fn build_reservation_routers() -> Router<AppRegistry> {
    let reservations_routers =
        Router::new().route("/:reservation_id", delete(cancel_reservation));

    Router::new().nest("/reservations", reservations_routers)
}
