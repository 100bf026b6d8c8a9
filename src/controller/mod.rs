//! Resource controllers: validation and persistence orchestration for index/show/store/update/destroy.
//! Controllers hold no per-request state; each operation runs in one store transaction.

mod crud;
mod relation;

pub use crud::CrudController;
pub use relation::RelationController;

use crate::error::AppError;
use crate::store::Record;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[async_trait]
pub trait ResourceController: Send + Sync + 'static {
    type Model: Serialize + Send;

    /// Live entities in store order; `include_deleted` adds soft-deleted ones.
    async fn index(&self, include_deleted: bool) -> Result<Vec<Self::Model>, AppError>;

    async fn show(&self, id: Uuid) -> Result<Self::Model, AppError>;

    async fn store(&self, input: Record) -> Result<Self::Model, AppError>;

    async fn update(&self, input: Record, id: Uuid) -> Result<Self::Model, AppError>;

    async fn destroy(&self, id: Uuid) -> Result<(), AppError>;
}
