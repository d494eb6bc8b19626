//! Entity CRUD routes. Handlers resolve the entity from the `:resource` segment.

use crate::handlers::entity::{attach, create, delete as delete_handler, detach, list, read, update};
use crate::state::AppState;
use axum::{
    routing::{get, patch},
    Router,
};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:resource", get(list).post(create))
        .route(
            "/:resource/:id",
            get(read).put(update).patch(update).delete(delete_handler),
        )
        .route("/:resource/:id/:relation/:related_id/attach", patch(attach))
        .route("/:resource/:id/:relation/:related_id/detach", patch(detach))
        .with_state(state)
}
