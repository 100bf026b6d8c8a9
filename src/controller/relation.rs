use crate::controller::{CrudController, ResourceController};
use crate::error::AppError;
use crate::model::Entity;
use crate::schema::{RelationDef, TableDef};
use crate::store::{record_id, within_transaction, EntityStore, Record, StoreTx};
use crate::validation::ValidationContract;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// CRUD for entities with many-to-many relations. The base write and every relation sync share one
/// transaction; relations are materialized on every read.
pub struct RelationController<E> {
    base: CrudController<E>,
}

impl<E: Entity> RelationController<E> {
    pub fn new(store: Arc<dyn EntityStore>, contract: ValidationContract) -> Self {
        RelationController {
            base: CrudController::new(store, contract),
        }
    }

    pub fn for_entity(store: Arc<dyn EntityStore>) -> Self {
        Self::new(store, E::contract())
    }
}

#[async_trait]
impl<E: Entity> ResourceController for RelationController<E> {
    type Model = E;

    async fn index(&self, include_deleted: bool) -> Result<Vec<E>, AppError> {
        within_transaction(self.base.store_handle(), move |tx| {
            Box::pin(async move {
                let mut out = Vec::new();
                for row in tx.list(E::table(), include_deleted).await? {
                    out.push(E::from_record(load_relations(tx, E::table(), row).await?)?);
                }
                Ok(out)
            })
        })
        .await
    }

    async fn show(&self, id: Uuid) -> Result<E, AppError> {
        within_transaction(self.base.store_handle(), move |tx| {
            Box::pin(async move {
                let row = CrudController::<E>::find_or_fail(tx, id).await?;
                E::from_record(load_relations(tx, E::table(), row).await?)
            })
        })
        .await
    }

    async fn store(&self, input: Record) -> Result<E, AppError> {
        let contract = self.base.contract();
        within_transaction(self.base.store_handle(), move |tx| {
            Box::pin(async move {
                let (fields, row) = CrudController::<E>::insert_validated(tx, &contract, &input).await?;
                let id = record_id(&row)?;
                sync_relations(tx, E::table(), id, &fields).await?;
                E::from_record(load_relations(tx, E::table(), row).await?)
            })
        })
        .await
    }

    async fn update(&self, input: Record, id: Uuid) -> Result<E, AppError> {
        let contract = self.base.contract();
        within_transaction(self.base.store_handle(), move |tx| {
            Box::pin(async move {
                let (fields, row) = CrudController::<E>::update_validated(tx, &contract, &input, id).await?;
                sync_relations(tx, E::table(), id, &fields).await?;
                E::from_record(load_relations(tx, E::table(), row).await?)
            })
        })
        .await
    }

    async fn destroy(&self, id: Uuid) -> Result<(), AppError> {
        self.base.destroy(id).await
    }
}

/// Replaces each relation set named in `fields` (relations whose input field is absent are left alone).
async fn sync_relations(
    tx: &mut dyn StoreTx,
    table: &'static TableDef,
    owner: Uuid,
    fields: &Record,
) -> Result<(), AppError> {
    for rel in table.relations {
        let Some(value) = fields.get(rel.input_field) else {
            continue;
        };
        let desired = related_ids(rel, value)?;
        sync_relation(tx, rel, owner, &desired).await?;
    }
    Ok(())
}

/// Full replace: detach what is no longer wanted, attach what is new, keep the rest.
async fn sync_relation(
    tx: &mut dyn StoreTx,
    rel: &'static RelationDef,
    owner: Uuid,
    desired: &[Uuid],
) -> Result<(), AppError> {
    let current = tx.related_ids(rel, owner).await?;
    let wanted: HashSet<Uuid> = desired.iter().copied().collect();
    let existing: HashSet<Uuid> = current.iter().copied().collect();

    let stale: Vec<Uuid> = current.into_iter().filter(|id| !wanted.contains(id)).collect();
    let mut seen = HashSet::new();
    let fresh: Vec<Uuid> = desired
        .iter()
        .copied()
        .filter(|id| !existing.contains(id) && seen.insert(*id))
        .collect();

    tracing::debug!(
        join_table = rel.join_table,
        %owner,
        detached = stale.len(),
        attached = fresh.len(),
        "sync relation"
    );
    tx.detach(rel, owner, &stale).await?;
    tx.attach(rel, owner, &fresh).await
}

fn related_ids(rel: &RelationDef, value: &Value) -> Result<Vec<Uuid>, AppError> {
    let parse = |v: &Value| {
        v.as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AppError::BadRequest(format!("{}: invalid id {}", rel.input_field, v)))
    };
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(parse).collect(),
        other => parse(other).map(|id| vec![id]),
    }
}

/// Adds each relation of `table` to `row` as an array of live related records.
async fn load_relations(
    tx: &mut dyn StoreTx,
    table: &'static TableDef,
    mut row: Record,
) -> Result<Record, AppError> {
    if table.relations.is_empty() {
        return Ok(row);
    }
    let owner = record_id(&row)?;
    for rel in table.relations {
        let ids = tx.related_ids(rel, owner).await?;
        let related = tx.find_many(rel.related, &ids).await?;
        row.insert(
            rel.name.to_string(),
            Value::Array(related.into_iter().map(Value::Object).collect()),
        );
    }
    Ok(row)
}
