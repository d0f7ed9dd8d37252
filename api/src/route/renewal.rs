use axum::{
    routing::{get, put},
    Router,
};
use registry::AppRegistry;

use crate::handler::renewal::{resolve_renewal, show_pending_renewal_list};

pub fn build_renewal_request_routers() -> Router<AppRegistry> {
    let renewal_routers = Router::new()
        .route("/", get(show_pending_renewal_list))
        .route("/:renewal_request_id", put(resolve_renewal));

    Router::new().nest("/renewal-requests", renewal_routers)
}
