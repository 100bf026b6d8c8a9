//! Resource handlers: index, show, store, update, destroy over any `ResourceController`.

use crate::controller::ResourceController;
use crate::error::AppError;
use crate::response::{success_created, success_many, success_one};
use crate::store::Record;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A path id that is not a UUID can never name an entity.
fn parse_id(id_str: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id_str).map_err(|_| AppError::NotFound(id_str.to_string()))
}

fn body_to_map(value: Value) -> Result<Record, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn flag(params: &HashMap<String, String>, key: &str) -> bool {
    params
        .get(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "" | "1" | "true"))
        .unwrap_or(false)
}

pub async fn index<C: ResourceController>(
    State(controller): State<Arc<C>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let rows = controller.index(flag(&params, "with_trashed")).await?;
    Ok(success_many(rows))
}

pub async fn show<C: ResourceController>(
    State(controller): State<Arc<C>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    Ok(success_one(controller.show(id).await?))
}

pub async fn store<C: ResourceController>(
    State(controller): State<Arc<C>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let input = body_to_map(body)?;
    Ok(success_created(controller.store(input).await?))
}

pub async fn update<C: ResourceController>(
    State(controller): State<Arc<C>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let input = body_to_map(body)?;
    Ok(success_one(controller.update(input, id).await?))
}

pub async fn destroy<C: ResourceController>(
    State(controller): State<Arc<C>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    controller.destroy(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
