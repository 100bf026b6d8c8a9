//! Catalog API: categories, genres and videos over a transactional entity store.

pub mod controller;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod response;
pub mod routes;
pub mod schema;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;
pub mod validation;

pub use controller::{CrudController, RelationController, ResourceController};
pub use error::{AppError, ConfigError};
pub use migration::apply_migrations;
pub use model::{catalog, Category, Entity, Genre, Video};
pub use response::{success_created, success_many, success_one};
pub use routes::{app, common_routes};
pub use settings::{Settings, StoreBackend};
pub use state::AppState;
pub use store::{ensure_database_exists, within_transaction, EntityStore, MemoryStore, PgStore};
