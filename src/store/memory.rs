//! Process-local store. A transaction holds the store lock for its whole lifetime and snapshots
//! the tables on first write, so rollback (or drop) restores the exact prior state.

use crate::error::AppError;
use crate::schema::{ColumnDef, Literal, RelationDef, TableDef, ID_COLUMN};
use crate::store::{not_found, record_id, EntityStore, Record, StoreTx};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
struct Tables {
    /// Rows per table, in insertion order.
    rows: HashMap<&'static str, Vec<Record>>,
    /// (owner, related) pairs per join table, in insertion order.
    joins: HashMap<&'static str, Vec<(Uuid, Uuid)>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        Ok(Box::new(MemoryTx { guard, snapshot: None }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    /// State before the first write; restored unless the transaction commits.
    snapshot: Option<Tables>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

fn is_live(row: &Record) -> bool {
    row.get("deleted_at").map_or(true, Value::is_null)
}

fn has_id(row: &Record, id: Uuid) -> bool {
    record_id(row).map_or(false, |r| r == id)
}

/// Rejects values the column type cannot hold, as a failed Postgres cast would.
fn checked(table: &TableDef, column: &ColumnDef, value: Value) -> Result<Value, AppError> {
    if value.is_null() || column.ty.accepts(&value) {
        Ok(value)
    } else {
        Err(AppError::Db(sqlx::Error::Encode(
            format!("{} is not a valid {} for {}.{}", value, column.ty.sql(), table.name, column.name).into(),
        )))
    }
}

impl MemoryTx {
    fn rows(&self, table: &TableDef) -> &[Record] {
        self.guard.rows.get(table.name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn write(&mut self) -> &mut Tables {
        if self.snapshot.is_none() {
            self.snapshot = Some(Tables::clone(&self.guard));
        }
        &mut self.guard
    }

    fn live_row_mut(&mut self, table: &'static TableDef, id: Uuid) -> Result<&mut Record, AppError> {
        self.write()
            .rows
            .entry(table.name)
            .or_default()
            .iter_mut()
            .find(|r| is_live(r) && has_id(r, id))
            .ok_or_else(|| not_found(table, id))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn create(&mut self, table: &'static TableDef, fields: &Record) -> Result<Record, AppError> {
        let mut row = Record::new();
        row.insert(ID_COLUMN.into(), Value::String(Uuid::new_v4().to_string()));
        for c in table.columns {
            let value = match fields.get(c.name) {
                Some(Value::Null) if !c.nullable && c.default.is_some() => None,
                other => other.cloned(),
            };
            let value = value
                .or_else(|| c.default.map(Literal::to_json))
                .unwrap_or(Value::Null);
            row.insert(c.name.into(), checked(table, c, value)?);
        }
        let ts = now();
        row.insert("created_at".into(), ts.clone());
        row.insert("updated_at".into(), ts);
        row.insert("deleted_at".into(), Value::Null);
        self.write().rows.entry(table.name).or_default().push(row.clone());
        Ok(row)
    }

    async fn find(&mut self, table: &'static TableDef, id: Uuid, include_deleted: bool) -> Result<Record, AppError> {
        self.rows(table)
            .iter()
            .find(|r| has_id(r, id) && (include_deleted || is_live(r)))
            .cloned()
            .ok_or_else(|| not_found(table, id))
    }

    async fn update(&mut self, table: &'static TableDef, id: Uuid, fields: &Record) -> Result<Record, AppError> {
        let mut changes = Vec::new();
        for c in table.columns {
            match fields.get(c.name) {
                Some(Value::Null) if !c.nullable => {}
                Some(v) => changes.push((c.name, checked(table, c, v.clone())?)),
                None => {}
            }
        }
        let row = self.live_row_mut(table, id)?;
        for (name, value) in changes {
            row.insert(name.into(), value);
        }
        row.insert("updated_at".into(), now());
        Ok(row.clone())
    }

    async fn soft_delete(&mut self, table: &'static TableDef, id: Uuid) -> Result<(), AppError> {
        let row = self.live_row_mut(table, id)?;
        let ts = now();
        row.insert("updated_at".into(), ts.clone());
        row.insert("deleted_at".into(), ts);
        Ok(())
    }

    async fn list(&mut self, table: &'static TableDef, include_deleted: bool) -> Result<Vec<Record>, AppError> {
        Ok(self
            .rows(table)
            .iter()
            .filter(|r| include_deleted || is_live(r))
            .cloned()
            .collect())
    }

    async fn count(&mut self, table: &'static TableDef, include_deleted: bool) -> Result<u64, AppError> {
        Ok(self
            .rows(table)
            .iter()
            .filter(|r| include_deleted || is_live(r))
            .count() as u64)
    }

    async fn existing_ids(&mut self, table: &'static TableDef, ids: &[Uuid]) -> Result<HashSet<Uuid>, AppError> {
        let wanted: HashSet<Uuid> = ids.iter().copied().collect();
        Ok(self
            .rows(table)
            .iter()
            .filter(|r| is_live(r))
            .filter_map(|r| record_id(r).ok())
            .filter(|id| wanted.contains(id))
            .collect())
    }

    async fn find_many(&mut self, table: &'static TableDef, ids: &[Uuid]) -> Result<Vec<Record>, AppError> {
        let wanted: HashSet<Uuid> = ids.iter().copied().collect();
        Ok(self
            .rows(table)
            .iter()
            .filter(|r| is_live(r) && record_id(r).map_or(false, |id| wanted.contains(&id)))
            .cloned()
            .collect())
    }

    async fn related_ids(&mut self, relation: &'static RelationDef, owner: Uuid) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .guard
            .joins
            .get(relation.join_table)
            .map(|pairs| pairs.iter().filter(|(o, _)| *o == owner).map(|(_, r)| *r).collect())
            .unwrap_or_default())
    }

    async fn attach(&mut self, relation: &'static RelationDef, owner: Uuid, ids: &[Uuid]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let pairs = self.write().joins.entry(relation.join_table).or_default();
        for id in ids {
            if !pairs.contains(&(owner, *id)) {
                pairs.push((owner, *id));
            }
        }
        Ok(())
    }

    async fn detach(&mut self, relation: &'static RelationDef, owner: Uuid, ids: &[Uuid]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let pairs = self.write().joins.entry(relation.join_table).or_default();
        pairs.retain(|(o, r)| !(*o == owner && ids.contains(r)));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let mut tx = self;
        tx.snapshot = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        drop(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CATEGORIES, VIDEOS};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn fields(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_applies_defaults_and_timestamps() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let row = tx
            .create(&CATEGORIES, &fields(json!({ "name": "n", "is_active": null, "bogus": 1 })))
            .await
            .unwrap();
        assert_eq!(row["name"], json!("n"));
        assert_eq!(row["description"], Value::Null);
        assert_eq!(row["is_active"], json!(true));
        assert_eq!(row["deleted_at"], Value::Null);
        assert_eq!(row["created_at"], row["updated_at"]);
        assert!(!row.contains_key("bogus"));
        assert!(Uuid::parse_str(row["id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.create(&CATEGORIES, &fields(json!({ "name": "gone" }))).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count(&CATEGORIES, true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn soft_deleted_rows_are_hidden_but_retrievable() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let row = tx.create(&CATEGORIES, &fields(json!({ "name": "n" }))).await.unwrap();
        let id = record_id(&row).unwrap();
        tx.soft_delete(&CATEGORIES, id).await.unwrap();

        assert!(matches!(tx.find(&CATEGORIES, id, false).await, Err(AppError::NotFound(_))));
        assert!(!tx.find(&CATEGORIES, id, true).await.unwrap()["deleted_at"].is_null());
        assert!(matches!(tx.soft_delete(&CATEGORIES, id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            tx.update(&CATEGORIES, id, &fields(json!({ "name": "x" }))).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(tx.count(&CATEGORIES, false).await.unwrap(), 0);
        assert_eq!(tx.list(&CATEGORIES, true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn writes_reject_values_the_column_cannot_hold() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_matches!(
            tx.create(&CATEGORIES, &fields(json!({ "name": 123 }))).await,
            Err(AppError::Db(sqlx::Error::Encode(_)))
        );
        assert_eq!(tx.count(&CATEGORIES, true).await.unwrap(), 0);

        let row = tx.create(&CATEGORIES, &fields(json!({ "name": "n" }))).await.unwrap();
        let id = record_id(&row).unwrap();
        assert_matches!(
            tx.update(&CATEGORIES, id, &fields(json!({ "name": "m", "is_active": "yes" }))).await,
            Err(AppError::Db(sqlx::Error::Encode(_)))
        );
        assert_eq!(tx.find(&CATEGORIES, id, false).await.unwrap()["name"], json!("n"));
    }

    #[tokio::test]
    async fn join_rows_attach_once_and_detach() {
        let store = MemoryStore::new();
        let relation = &VIDEOS.relations[0];
        let (owner, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut tx = store.begin().await.unwrap();
        tx.attach(relation, owner, &[a, b]).await.unwrap();
        tx.attach(relation, owner, &[a]).await.unwrap();
        assert_eq!(tx.related_ids(relation, owner).await.unwrap(), vec![a, b]);
        tx.detach(relation, owner, &[a]).await.unwrap();
        assert_eq!(tx.related_ids(relation, owner).await.unwrap(), vec![b]);
        assert!(tx.related_ids(relation, Uuid::new_v4()).await.unwrap().is_empty());
    }
}
