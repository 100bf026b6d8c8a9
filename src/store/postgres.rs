//! PostgreSQL store: every operation runs on a `sqlx` transaction using the safe SQL builder.

use crate::error::AppError;
use crate::schema::{ColumnType, RelationDef, TableDef, ID_COLUMN, TIMESTAMP_COLUMNS};
use crate::sql::{self, PgBindValue, QueryBuf};
use crate::store::{not_found, EntityStore, Record, StoreTx};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{ConnectOptions, PgPool, Postgres, Row, Transaction};
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgStore {
            pool,
            schema: schema.into(),
        }
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx {
            tx,
            schema: self.schema.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
    schema: String,
}

fn bind_all(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

impl PgTx {
    async fn fetch_optional(&mut self, q: &QueryBuf) -> Result<Option<PgRow>, AppError> {
        Ok(bind_all(q).fetch_optional(&mut *self.tx).await?)
    }

    async fn fetch_all(&mut self, q: &QueryBuf) -> Result<Vec<PgRow>, AppError> {
        Ok(bind_all(q).fetch_all(&mut *self.tx).await?)
    }

    async fn execute(&mut self, q: &QueryBuf) -> Result<u64, AppError> {
        Ok(bind_all(q).execute(&mut *self.tx).await?.rows_affected())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn create(&mut self, table: &'static TableDef, fields: &Record) -> Result<Record, AppError> {
        let q = sql::insert(&self.schema, table, Uuid::new_v4(), fields);
        let row = self
            .fetch_optional(&q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        row_to_record(&row, table)
    }

    async fn find(&mut self, table: &'static TableDef, id: Uuid, include_deleted: bool) -> Result<Record, AppError> {
        let q = sql::select_by_id(&self.schema, table, id, include_deleted);
        match self.fetch_optional(&q).await? {
            Some(row) => row_to_record(&row, table),
            None => Err(not_found(table, id)),
        }
    }

    async fn update(&mut self, table: &'static TableDef, id: Uuid, fields: &Record) -> Result<Record, AppError> {
        let q = sql::update(&self.schema, table, id, fields);
        match self.fetch_optional(&q).await? {
            Some(row) => row_to_record(&row, table),
            None => Err(not_found(table, id)),
        }
    }

    async fn soft_delete(&mut self, table: &'static TableDef, id: Uuid) -> Result<(), AppError> {
        let q = sql::soft_delete(&self.schema, table, id);
        if self.execute(&q).await? == 0 {
            return Err(not_found(table, id));
        }
        Ok(())
    }

    async fn list(&mut self, table: &'static TableDef, include_deleted: bool) -> Result<Vec<Record>, AppError> {
        let q = sql::select_list(&self.schema, table, include_deleted);
        let rows = self.fetch_all(&q).await?;
        rows.iter().map(|r| row_to_record(r, table)).collect()
    }

    async fn count(&mut self, table: &'static TableDef, include_deleted: bool) -> Result<u64, AppError> {
        let q = sql::count(&self.schema, table, include_deleted);
        let row = self
            .fetch_optional(&q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        let n: i64 = row.try_get("count")?;
        Ok(n.max(0) as u64)
    }

    async fn existing_ids(&mut self, table: &'static TableDef, ids: &[Uuid]) -> Result<HashSet<Uuid>, AppError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let q = sql::select_existing_ids(&self.schema, table, ids);
        let rows = self.fetch_all(&q).await?;
        rows.iter()
            .map(|r| r.try_get::<Uuid, _>(ID_COLUMN).map_err(AppError::from))
            .collect()
    }

    async fn find_many(&mut self, table: &'static TableDef, ids: &[Uuid]) -> Result<Vec<Record>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let q = sql::select_by_ids(&self.schema, table, ids);
        let rows = self.fetch_all(&q).await?;
        rows.iter().map(|r| row_to_record(r, table)).collect()
    }

    async fn related_ids(&mut self, relation: &'static RelationDef, owner: Uuid) -> Result<Vec<Uuid>, AppError> {
        let q = sql::select_related_ids(&self.schema, relation, owner);
        let rows = self.fetch_all(&q).await?;
        rows.iter()
            .map(|r| r.try_get::<Uuid, _>(relation.related_column).map_err(AppError::from))
            .collect()
    }

    async fn attach(&mut self, relation: &'static RelationDef, owner: Uuid, ids: &[Uuid]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let q = sql::attach(&self.schema, relation, owner, ids);
        self.execute(&q).await?;
        Ok(())
    }

    async fn detach(&mut self, relation: &'static RelationDef, owner: Uuid, ids: &[Uuid]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let q = sql::detach(&self.schema, relation, owner, ids);
        self.execute(&q).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Decode a row into JSON using the declared column types.
fn row_to_record(row: &PgRow, table: &TableDef) -> Result<Record, AppError> {
    let mut map = Record::new();
    let id: Uuid = row.try_get(ID_COLUMN)?;
    map.insert(ID_COLUMN.into(), Value::String(id.to_string()));
    for c in table.columns {
        let v = match c.ty {
            ColumnType::Varchar(_) | ColumnType::Text => {
                row.try_get::<Option<String>, _>(c.name)?.map(Value::String)
            }
            ColumnType::Boolean => row.try_get::<Option<bool>, _>(c.name)?.map(Value::Bool),
            ColumnType::SmallInt => row
                .try_get::<Option<i16>, _>(c.name)?
                .map(|n| Value::Number(n.into())),
            ColumnType::Integer => row
                .try_get::<Option<i32>, _>(c.name)?
                .map(|n| Value::Number(n.into())),
        };
        map.insert(c.name.into(), v.unwrap_or(Value::Null));
    }
    for name in TIMESTAMP_COLUMNS {
        let ts: Option<chrono::DateTime<chrono::Utc>> = row.try_get(name)?;
        map.insert(
            name.into(),
            ts.map(|d| Value::String(d.to_rfc3339())).unwrap_or(Value::Null),
        );
    }
    Ok(map)
}

/// Create the database named in `database_url` if it does not exist (connects to `postgres`).
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}
