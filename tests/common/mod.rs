#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, Response};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use catalog_api::schema::{RelationDef, TableDef};
use catalog_api::store::{EntityStore, MemoryStore, Record, StoreTx};
use catalog_api::{app, AppError, AppState};

/// Full router over an in-memory store, as the server builds it.
pub fn build_test_app(store: Arc<dyn EntityStore>) -> Router {
    app(AppState::new(store))
}

pub fn memory_app() -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    (build_test_app(Arc::new(store.clone())), store)
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn put_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn patch_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::PATCH, uri, Some(body)).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Create a resource over HTTP and return its `data` object.
pub async fn create(app: &Router, uri: &str, body: Value) -> Value {
    let response = post_json(app.clone(), uri, body).await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

/// Rule kinds reported for `field` in a 422 body.
pub fn failed_rules(body: &Value, field: &str) -> Vec<String> {
    body["error"]["details"]["failures"][field]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|f| f["rule"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub fn input(v: Value) -> Record {
    v.as_object().cloned().unwrap()
}

/// Memory store whose transactions fail every `attach`, for exercising rollback after a base write.
#[derive(Clone, Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl EntityStore for FailingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        Ok(Box::new(FailingTx {
            inner: self.inner.begin().await?,
        }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.inner.ping().await
    }
}

pub fn forced_failure() -> AppError {
    AppError::Db(sqlx::Error::Protocol("forced relation failure".into()))
}

struct FailingTx {
    inner: Box<dyn StoreTx>,
}

#[async_trait]
impl StoreTx for FailingTx {
    async fn create(&mut self, table: &'static TableDef, fields: &Record) -> Result<Record, AppError> {
        self.inner.create(table, fields).await
    }

    async fn find(&mut self, table: &'static TableDef, id: Uuid, include_deleted: bool) -> Result<Record, AppError> {
        self.inner.find(table, id, include_deleted).await
    }

    async fn update(&mut self, table: &'static TableDef, id: Uuid, fields: &Record) -> Result<Record, AppError> {
        self.inner.update(table, id, fields).await
    }

    async fn soft_delete(&mut self, table: &'static TableDef, id: Uuid) -> Result<(), AppError> {
        self.inner.soft_delete(table, id).await
    }

    async fn list(&mut self, table: &'static TableDef, include_deleted: bool) -> Result<Vec<Record>, AppError> {
        self.inner.list(table, include_deleted).await
    }

    async fn count(&mut self, table: &'static TableDef, include_deleted: bool) -> Result<u64, AppError> {
        self.inner.count(table, include_deleted).await
    }

    async fn existing_ids(&mut self, table: &'static TableDef, ids: &[Uuid]) -> Result<HashSet<Uuid>, AppError> {
        self.inner.existing_ids(table, ids).await
    }

    async fn find_many(&mut self, table: &'static TableDef, ids: &[Uuid]) -> Result<Vec<Record>, AppError> {
        self.inner.find_many(table, ids).await
    }

    async fn related_ids(&mut self, relation: &'static RelationDef, owner: Uuid) -> Result<Vec<Uuid>, AppError> {
        self.inner.related_ids(relation, owner).await
    }

    async fn attach(&mut self, _relation: &'static RelationDef, _owner: Uuid, _ids: &[Uuid]) -> Result<(), AppError> {
        Err(forced_failure())
    }

    async fn detach(&mut self, relation: &'static RelationDef, owner: Uuid, ids: &[Uuid]) -> Result<(), AppError> {
        self.inner.detach(relation, owner, ids).await
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.inner.rollback().await
    }
}

/// Number of rows in `table`, soft-deleted included when asked.
pub async fn count_rows(store: &dyn EntityStore, table: &'static TableDef, include_deleted: bool) -> u64 {
    let mut tx = store.begin().await.unwrap();
    let n = tx.count(table, include_deleted).await.unwrap();
    tx.rollback().await.unwrap();
    n
}
