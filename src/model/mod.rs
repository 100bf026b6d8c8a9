//! Catalog resources: table definitions, typed records and validation contracts.

mod category;
mod genre;
mod video;

pub use category::{Category, CATEGORIES};
pub use genre::{Genre, GENRES};
pub use video::{Video, RATING_LIST, VIDEOS};

use crate::error::AppError;
use crate::schema::TableDef;
use crate::store::Record;
use crate::validation::ValidationContract;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A resource backed by one table. Records read from the store deserialize into `Self`.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn table() -> &'static TableDef;

    fn contract() -> ValidationContract;

    fn from_record(record: Record) -> Result<Self, AppError> {
        Ok(serde_json::from_value(serde_json::Value::Object(record))?)
    }
}

/// Every table the service manages, related tables before the tables that reference them.
pub fn catalog() -> [&'static TableDef; 3] {
    [&CATEGORIES, &GENRES, &VIDEOS]
}
