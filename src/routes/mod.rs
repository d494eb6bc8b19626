//! Route builders: common routes and entity CRUD under `/api`.

mod common;
mod entity;
pub use common::common_routes;
pub use entity::entity_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

/// Full application router with a request body size cap.
pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .nest("/api", entity_routes(state))
        .layer(RequestBodyLimitLayer::new(body_limit))
}
