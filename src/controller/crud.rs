use crate::controller::ResourceController;
use crate::error::AppError;
use crate::model::Entity;
use crate::store::{within_transaction, EntityStore, Record, StoreTx};
use crate::validation::ValidationContract;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// CRUD over one entity type, parameterized by the store and the validation contract it was built with.
pub struct CrudController<E> {
    store: Arc<dyn EntityStore>,
    contract: Arc<ValidationContract>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> CrudController<E> {
    pub fn new(store: Arc<dyn EntityStore>, contract: ValidationContract) -> Self {
        CrudController {
            store,
            contract: Arc::new(contract),
            _entity: PhantomData,
        }
    }

    /// Controller using the entity's own contract.
    pub fn for_entity(store: Arc<dyn EntityStore>) -> Self {
        Self::new(store, E::contract())
    }

    pub fn store_handle(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    pub fn contract(&self) -> Arc<ValidationContract> {
        Arc::clone(&self.contract)
    }

    /// The live row for `id`, or `NotFound`.
    pub async fn find_or_fail(tx: &mut dyn StoreTx, id: Uuid) -> Result<Record, AppError> {
        tx.find(E::table(), id, false).await
    }

    /// Validates `input` with the store rules and inserts the base row. Returns (validated fields, row).
    pub async fn insert_validated(
        tx: &mut dyn StoreTx,
        contract: &ValidationContract,
        input: &Record,
    ) -> Result<(Record, Record), AppError> {
        let fields = contract.validate_store(tx, input).await?;
        let row = tx.create(E::table(), &fields).await?;
        Ok((fields, row))
    }

    /// Find-or-fail, then validates `input` with the update rules and applies it to the base row.
    pub async fn update_validated(
        tx: &mut dyn StoreTx,
        contract: &ValidationContract,
        input: &Record,
        id: Uuid,
    ) -> Result<(Record, Record), AppError> {
        Self::find_or_fail(tx, id).await?;
        let fields = contract.validate_update(tx, input).await?;
        let row = tx.update(E::table(), id, &fields).await?;
        Ok((fields, row))
    }
}

#[async_trait]
impl<E: Entity> ResourceController for CrudController<E> {
    type Model = E;

    async fn index(&self, include_deleted: bool) -> Result<Vec<E>, AppError> {
        within_transaction(self.store_handle(), move |tx| {
            Box::pin(async move {
                let rows = tx.list(E::table(), include_deleted).await?;
                rows.into_iter().map(E::from_record).collect()
            })
        })
        .await
    }

    async fn show(&self, id: Uuid) -> Result<E, AppError> {
        within_transaction(self.store_handle(), move |tx| {
            Box::pin(async move { E::from_record(Self::find_or_fail(tx, id).await?) })
        })
        .await
    }

    async fn store(&self, input: Record) -> Result<E, AppError> {
        let contract = self.contract();
        // Decoded before commit, so a row that cannot be read back is rolled back.
        let created = within_transaction(self.store_handle(), move |tx| {
            Box::pin(async move {
                let (_, row) = Self::insert_validated(tx, &contract, &input).await?;
                E::from_record(row)
            })
        })
        .await?;
        tracing::debug!(table = E::table().name, "created");
        Ok(created)
    }

    async fn update(&self, input: Record, id: Uuid) -> Result<E, AppError> {
        let contract = self.contract();
        within_transaction(self.store_handle(), move |tx| {
            Box::pin(async move {
                let (_, row) = Self::update_validated(tx, &contract, &input, id).await?;
                E::from_record(row)
            })
        })
        .await
    }

    async fn destroy(&self, id: Uuid) -> Result<(), AppError> {
        within_transaction(self.store_handle(), move |tx| {
            Box::pin(async move {
                Self::find_or_fail(tx, id).await?;
                tx.soft_delete(E::table(), id).await
            })
        })
        .await?;
        tracing::debug!(table = E::table().name, %id, "soft deleted");
        Ok(())
    }
}
