use axum::Router;

pub mod admin;
pub mod orders;
pub mod system;

/// Router for all caller-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/admin", admin::router())
}
