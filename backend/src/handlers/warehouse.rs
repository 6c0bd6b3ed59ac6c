//! Warehouse HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use shared::{Action, Resource};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::warehouse::{SaveWarehouseInput, WarehouseFilter, WarehouseService};
use crate::AppState;

/// List warehouses, optionally filtered by `tipo` and `ativo`
pub async fn list_warehouses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<WarehouseFilter>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Warehouse, Action::View)?;
    let service = WarehouseService::new(state.db.clone());
    let armazens = service.list(filter).await?;
    Ok(Json(serde_json::json!({ "armazens": armazens })))
}

pub async fn get_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(armazem_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Warehouse, Action::View)?;
    let service = WarehouseService::new(state.db.clone());
    Ok(Json(service.get(armazem_id).await?))
}

pub async fn create_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<SaveWarehouseInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Warehouse, Action::Create)?;
    let service = WarehouseService::new(state.db.clone());
    let armazem = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(armazem)))
}

pub async fn update_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(armazem_id): Path<Uuid>,
    Json(input): Json<SaveWarehouseInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Warehouse, Action::Edit)?;
    let service = WarehouseService::new(state.db.clone());
    Ok(Json(service.update(armazem_id, input).await?))
}

pub async fn delete_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(armazem_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Warehouse, Action::Delete)?;
    let service = WarehouseService::new(state.db.clone());
    service.delete(armazem_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
