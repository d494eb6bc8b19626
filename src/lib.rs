//! CRUD gateway: configuration-driven REST CRUD with scoped field visibility.

pub mod codec;
pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{builtin, load_from_path, resolve, EntitiesConfig, EntityDescriptor, Registry};
pub use entity::{Entity, Violation};
pub use error::{AppError, ConfigError};
pub use filter::{FilterPipeline, QueryFilter, SearchParams};
pub use response::{success_many, success_one, success_one_ok};
pub use routes::{common_routes, entity_routes, router};
pub use service::{ConstraintValidator, CrudEngine, Outcome, Validator};
pub use settings::{Settings, StoreKind};
pub use state::AppState;
pub use store::{ChangeSet, EntityStore, MemoryStore, PgStore, StoreError};
