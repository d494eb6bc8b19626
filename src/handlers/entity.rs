//! Entity CRUD handlers: list, create, read, update, delete, attach, detach.

use crate::config::EntityDescriptor;
use crate::error::AppError;
use crate::response::{success_many, success_one, success_one_ok};
use crate::service::Outcome;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

fn parse_id(id_str: &str) -> Result<i64, AppError> {
    id_str
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid id '{}'", id_str)))
}

fn descriptor(state: &AppState, resource: &str) -> Result<Arc<EntityDescriptor>, AppError> {
    let registry = state.engine.registry();
    registry
        .entity_by_path(resource)
        .or_else(|| registry.get(resource))
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("unknown resource '{}'", resource)))
}

fn body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AppError::Rejected {
            status: e.status(),
            message: e.body_text(),
        })
}

/// Success payload, or the matching transport error.
fn settle(outcome: Outcome) -> Result<Option<Value>, AppError> {
    match outcome {
        Outcome::Success(v) => Ok(v),
        Outcome::NotFound(m) => Err(AppError::NotFound(m)),
        Outcome::ValidationFailed(v) => Err(AppError::Validation(v)),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = descriptor(&state, &resource)?;
    let outcome = state
        .engine
        .list(&entity.name, &entity.scopes.list, &params)
        .await?;
    let rows = match settle(outcome)? {
        Some(Value::Array(rows)) => rows,
        _ => Vec::new(),
    };
    Ok(success_many(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let entity = descriptor(&state, &resource)?;
    let payload = body(payload)?;
    let outcome = state
        .engine
        .create(&entity.name, &entity.scopes.create, &entity.scopes.read, &payload)
        .await?;
    Ok(success_one(settle(outcome)?.unwrap_or(Value::Null)))
}

pub async fn read(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = descriptor(&state, &resource)?;
    let id = parse_id(&id)?;
    let outcome = state.engine.get(&entity.name, &entity.scopes.read, id).await?;
    Ok(success_one_ok(settle(outcome)?.unwrap_or(Value::Null)))
}

pub async fn update(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let entity = descriptor(&state, &resource)?;
    let id = parse_id(&id)?;
    let payload = body(payload)?;
    let outcome = state
        .engine
        .update(
            &entity.name,
            entity.scopes.update.as_deref(),
            &entity.scopes.read,
            id,
            &payload,
        )
        .await?;
    Ok(success_one_ok(settle(outcome)?.unwrap_or(Value::Null)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let entity = descriptor(&state, &resource)?;
    let id = parse_id(&id)?;
    settle(state.engine.delete(&entity.name, id).await?)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn attach(
    State(state): State<AppState>,
    Path((resource, id, relation, related_id)): Path<(String, String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = descriptor(&state, &resource)?;
    let (id, related_id) = (parse_id(&id)?, parse_id(&related_id)?);
    let outcome = state
        .engine
        .attach(&entity.name, &relation, id, related_id, &entity.scopes.read)
        .await?;
    Ok(success_one_ok(settle(outcome)?.unwrap_or(Value::Null)))
}

pub async fn detach(
    State(state): State<AppState>,
    Path((resource, id, relation, related_id)): Path<(String, String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = descriptor(&state, &resource)?;
    let (id, related_id) = (parse_id(&id)?, parse_id(&related_id)?);
    let outcome = state
        .engine
        .detach(&entity.name, &relation, id, related_id, &entity.scopes.read)
        .await?;
    Ok(success_one_ok(settle(outcome)?.unwrap_or(Value::Null)))
}
