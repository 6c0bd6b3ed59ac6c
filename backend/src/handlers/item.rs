//! Item catalog and component HTTP handlers

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
use crate::services::item::{
    AddComponentInput, CreateItemInput, ItemFilter, ItemService, UpdateComponentInput,
    UpdateItemInput,
};
use crate::AppState;

/// Search the catalog by code or description
pub async fn list_items(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<ItemFilter>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Item, Action::View)?;
    let service = ItemService::new(state.db.clone());
    let itens = service.list(filter).await?;
    Ok(Json(serde_json::json!({ "itens": itens })))
}

pub async fn get_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Item, Action::View)?;
    let service = ItemService::new(state.db.clone());
    Ok(Json(service.get(item_id).await?))
}

pub async fn create_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateItemInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Item, Action::Create)?;
    let service = ItemService::new(state.db.clone());
    let item = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateItemInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Item, Action::Edit)?;
    let service = ItemService::new(state.db.clone());
    Ok(Json(service.update(item_id, input).await?))
}

pub async fn delete_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Item, Action::Delete)?;
    let service = ItemService::new(state.db.clone());
    service.delete(item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Components
// ============================================================================

pub async fn list_components(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Item, Action::View)?;
    let service = ItemService::new(state.db.clone());
    Ok(Json(service.list_components(item_id).await?))
}

pub async fn add_component(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<AddComponentInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Item, Action::Edit)?;
    let service = ItemService::new(state.db.clone());
    let componentes = service.add_component(item_id, input).await?;
    Ok((StatusCode::CREATED, Json(componentes)))
}

pub async fn update_component(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((item_id, componente_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateComponentInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Item, Action::Edit)?;
    let service = ItemService::new(state.db.clone());
    Ok(Json(
        service
            .update_component_quantity(item_id, componente_id, input)
            .await?,
    ))
}

pub async fn remove_component(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((item_id, componente_id)): Path<(Uuid, Uuid)>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Item, Action::Edit)?;
    let service = ItemService::new(state.db.clone());
    service.remove_component(item_id, componente_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
