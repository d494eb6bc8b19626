//! CrudEngine: generic CRUD over the persistence and validation ports.

mod engine;
mod outcome;
mod validation;
pub use engine::CrudEngine;
pub use outcome::Outcome;
pub(crate) use validation::value_eq;
pub use validation::{ConstraintValidator, Validator};
