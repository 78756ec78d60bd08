//! Entity CRUD handlers: count, list, read, create, update, patch, delete, bulk.
//! Every handler runs against the [`CrudEngine`] of the entity its router was built for.

use crate::error::AppError;
use crate::response::{success_many, success_many_created, success_one, success_one_ok};
use crate::service::{CrudEngine, EntityInput};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub filter: Option<String>,
    pub value: Option<String>,
    #[serde(default)]
    pub skip: u64,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteBody {
    pub pks: Vec<Value>,
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    body.map(|Json(v)| v)
        .map_err(|e| AppError::Validation(e.body_text()))
}

pub async fn count(State(engine): State<CrudEngine>) -> Result<impl IntoResponse, AppError> {
    let count = engine.count().await?;
    Ok(success_one_ok(json!({ "count": count })))
}

pub async fn read_all(
    State(engine): State<CrudEngine>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = params.map_err(|e| AppError::Validation(e.body_text()))?;
    // An empty value means no filter.
    let value = params.value.filter(|v| !v.is_empty()).map(Value::String);
    let rows = engine
        .read_all(params.filter.as_deref(), value.as_ref(), params.skip, params.limit)
        .await?;
    Ok(success_many(rows))
}

pub async fn read_one(
    State(engine): State<CrudEngine>,
    Path(pk): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let row = engine.read_one(&Value::String(pk)).await?;
    Ok(success_one_ok(row))
}

pub async fn create(
    State(engine): State<CrudEngine>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let input = EntityInput::create(json_body(body)?)?;
    let row = engine.create(&input).await?;
    Ok(success_one(row))
}

pub async fn bulk_create(
    State(engine): State<CrudEngine>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let items = match json_body(body)? {
        Value::Array(items) => items,
        _ => return Err(AppError::Validation("body must be a JSON array".into())),
    };
    let inputs = items
        .into_iter()
        .map(EntityInput::create)
        .collect::<Result<Vec<_>, _>>()?;
    let rows = engine.bulk_create(&inputs).await?;
    Ok(success_many_created(rows))
}

/// PUT: full replacement; every updatable field is required.
pub async fn update(
    State(engine): State<CrudEngine>,
    Path(pk): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let input = EntityInput::update(json_body(body)?)?;
    let row = engine.update(&Value::String(pk), &input, true).await?;
    Ok(success_one_ok(row))
}

pub async fn patch(
    State(engine): State<CrudEngine>,
    Path(pk): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let input = EntityInput::patch(json_body(body)?)?;
    let row = engine.update(&Value::String(pk), &input, false).await?;
    Ok(success_one_ok(row))
}

pub async fn delete(
    State(engine): State<CrudEngine>,
    Path(pk): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    engine.delete(&Value::String(pk)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn bulk_delete(
    State(engine): State<CrudEngine>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body: BulkDeleteBody = serde_json::from_value(json_body(body)?)
        .map_err(|e| AppError::Validation(format!("invalid bulk delete body: {}", e)))?;
    let deleted = engine.bulk_delete(&body.pks).await?;
    Ok(success_one_ok(json!({ "deleted": deleted })))
}
