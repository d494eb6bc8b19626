//! HTTP handlers for entity CRUD and relation changes.

pub mod entity;
pub use entity::*;
