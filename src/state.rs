//! Shared application state for all routes.

use crate::service::CrudEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CrudEngine>,
}

impl AppState {
    pub fn new(engine: CrudEngine) -> Self {
        AppState {
            engine: Arc::new(engine),
        }
    }
}
