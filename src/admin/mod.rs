//! Control plane.
//!
//! # Endpoints
//! ```text
//! POST   /registry/services               register an instance
//! GET    /registry/services?name=         discover instances
//! DELETE /registry/services?name=&host=&port=
//! POST   /registry/services/check?name=   probe a service now
//! ```
//!
//! # Design Decisions
//! - Served on its own listener, never on the data plane
//! - Input errors are 400, store failures 500, both as JSON

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::post, Router};

use self::auth::{admin_auth_middleware, AdminToken};
use self::handlers::*;

pub fn setup_admin_router(state: AdminState, token: AdminToken) -> Router {
    Router::new()
        .route(
            "/registry/services",
            post(register_service)
                .get(discover_services)
                .delete(deregister_service),
        )
        .route("/registry/services/check", post(check_service))
        .layer(middleware::from_fn_with_state(token, admin_auth_middleware))
        .with_state(state)
}
