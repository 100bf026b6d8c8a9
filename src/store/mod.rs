//! Entity persistence: transaction-scoped CRUD, soft delete and join-table maintenance.
//! Backends: PostgreSQL (`PgStore`) and process-local memory (`MemoryStore`).

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgStore};

use crate::error::AppError;
use crate::schema::{RelationDef, TableDef};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// A persisted row as JSON: `id`, declared columns, `created_at`, `updated_at`, `deleted_at`.
pub type Record = serde_json::Map<String, Value>;

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;

    /// Cheap liveness check used by readiness probes.
    async fn ping(&self) -> Result<(), AppError>;
}

/// One unit of work. Dropping a transaction without `commit` discards its writes.
#[async_trait]
pub trait StoreTx: Send {
    /// Inserts a row with a freshly generated id. Unknown keys are ignored; missing columns take
    /// their default (or null).
    async fn create(&mut self, table: &'static TableDef, fields: &Record) -> Result<Record, AppError>;

    async fn find(
        &mut self,
        table: &'static TableDef,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Record, AppError>;

    /// Applies the known columns in `fields` to a live row and refreshes `updated_at`.
    async fn update(&mut self, table: &'static TableDef, id: Uuid, fields: &Record) -> Result<Record, AppError>;

    async fn soft_delete(&mut self, table: &'static TableDef, id: Uuid) -> Result<(), AppError>;

    async fn list(&mut self, table: &'static TableDef, include_deleted: bool) -> Result<Vec<Record>, AppError>;

    async fn count(&mut self, table: &'static TableDef, include_deleted: bool) -> Result<u64, AppError>;

    /// Subset of `ids` naming live rows.
    async fn existing_ids(&mut self, table: &'static TableDef, ids: &[Uuid]) -> Result<HashSet<Uuid>, AppError>;

    /// Live rows among `ids`, in store order.
    async fn find_many(&mut self, table: &'static TableDef, ids: &[Uuid]) -> Result<Vec<Record>, AppError>;

    async fn related_ids(&mut self, relation: &'static RelationDef, owner: Uuid) -> Result<Vec<Uuid>, AppError>;

    /// Inserts join rows; pairs already present are left alone.
    async fn attach(&mut self, relation: &'static RelationDef, owner: Uuid, ids: &[Uuid]) -> Result<(), AppError>;

    async fn detach(&mut self, relation: &'static RelationDef, owner: Uuid, ids: &[Uuid]) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

pub type TxFuture<'t, T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 't>>;

/// Runs `work` in a fresh transaction: commit on `Ok`, roll back on any `Err` and return that
/// error unchanged.
pub async fn within_transaction<T, F>(store: &dyn EntityStore, work: F) -> Result<T, AppError>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn StoreTx) -> TxFuture<'t, T> + Send,
{
    let mut tx = store.begin().await?;
    let result = work(tx.as_mut()).await;
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            tracing::debug!(error = %err, "rolling back transaction");
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

/// The `id` of a record returned by a store.
pub fn record_id(record: &Record) -> Result<Uuid, AppError> {
    record
        .get(crate::schema::ID_COLUMN)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AppError::Db(sqlx::Error::ColumnNotFound(crate::schema::ID_COLUMN.into())))
}

pub(crate) fn not_found(table: &TableDef, id: Uuid) -> AppError {
    AppError::NotFound(format!("{} {}", table.name, id))
}
