//! Requisition HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::{deserialize_non_blank, Action, ManifestKind, PickLine, Resource};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::manifest::ManifestFormat;
use crate::services::requisition::{
    ExportOutcome, RequisitionFilter, RequisitionService, SaveRequisitionInput,
};
use crate::AppState;

/// Status after an export, so clients can refresh without another request
pub const STATUS_HEADER: HeaderName = HeaderName::from_static("x-requisicao-status");

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default, deserialize_with = "deserialize_non_blank")]
    pub formato: Option<String>,
}

fn service(state: &AppState) -> RequisitionService {
    RequisitionService::new(state.db.clone(), state.config.database.transition_retries)
}

pub async fn list_requisitions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<RequisitionFilter>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Requisition, Action::View)?;
    let requisicoes = service(&state).list(filter).await?;
    Ok(Json(serde_json::json!({ "requisicoes": requisicoes })))
}

/// Requisition with warehouse codes and resolved lines
pub async fn get_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(requisicao_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Requisition, Action::View)?;
    Ok(Json(service(&state).get(requisicao_id).await?))
}

pub async fn create_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<SaveRequisitionInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Requisition, Action::Create)?;
    let requisicao = service(&state).create(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(requisicao)))
}

pub async fn update_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(requisicao_id): Path<Uuid>,
    Json(input): Json<SaveRequisitionInput>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Requisition, Action::Edit)?;
    Ok(Json(service(&state).update(requisicao_id, input).await?))
}

pub async fn delete_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(requisicao_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Requisition, Action::Delete)?;
    service(&state).delete(requisicao_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /requisicoes/:id/atender-item
pub async fn pick_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(requisicao_id): Path<Uuid>,
    Json(input): Json<PickLine>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Requisition, Action::Pick)?;
    Ok(Json(service(&state).pick(requisicao_id, input).await?))
}

/// PATCH /requisicoes/:id/completar-separacao
pub async fn complete_picking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(requisicao_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Requisition, Action::Pick)?;
    Ok(Json(service(&state).complete_picking(requisicao_id).await?))
}

/// PATCH /requisicoes/:id/confirmar-separacao
pub async fn confirm_picking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(requisicao_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Requisition, Action::Pick)?;
    Ok(Json(service(&state).confirm_picking(requisicao_id).await?))
}

/// PATCH /requisicoes/:id/cancelar
pub async fn cancel_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(requisicao_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require(Resource::Requisition, Action::Cancel)?;
    Ok(Json(service(&state).cancel(requisicao_id).await?))
}

/// GET /requisicoes/:id/export-trfl
pub async fn export_trfl(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(requisicao_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    export(state, user, requisicao_id, ManifestKind::Trfl, query).await
}

/// GET /requisicoes/:id/export-tra
pub async fn export_tra(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(requisicao_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    export(state, user, requisicao_id, ManifestKind::Tra, query).await
}

async fn export(
    state: AppState,
    user: crate::middleware::AuthUser,
    requisicao_id: Uuid,
    kind: ManifestKind,
    query: ExportQuery,
) -> AppResult<Response> {
    user.require(Resource::Requisition, Action::Export)?;
    let format = ManifestFormat::from_query(query.formato.as_deref());
    let outcome = service(&state).export(requisicao_id, kind, format).await?;
    Ok(manifest_response(outcome))
}

fn manifest_response(outcome: ExportOutcome) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", outcome.file.file_name);
    (
        [
            (header::CONTENT_TYPE, outcome.file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (STATUS_HEADER, outcome.status.as_str().to_string()),
        ],
        outcome.file.bytes,
    )
        .into_response()
}
