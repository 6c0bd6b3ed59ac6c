//! Error handling for the Almox server
//!
//! Provides consistent error responses in English and Portuguese

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use shared::{ValidationError, WorkflowError};

use crate::services::manifest::ManifestError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions: requires {resource}:{action}")]
    InsufficientPermissions {
        resource: &'static str,
        action: &'static str,
    },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_pt: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("State conflict: {message}")]
    StateConflict {
        current: String,
        message: String,
        message_pt: String,
    },

    #[error("Conflict: {message}")]
    Conflict {
        resource: String,
        message: String,
        message_pt: String,
    },

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation {
            field: err.field,
            message: err.message,
            message_pt: err.message_pt,
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(v) => v.into(),
            WorkflowError::LineNotFound(id) => {
                AppError::NotFound(format!("Requisition line {}", id))
            }
            WorkflowError::StateConflict {
                current,
                message,
                message_pt,
            } => AppError::StateConflict {
                current: current.to_string(),
                message,
                message_pt,
            },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("request".to_string(), "Invalid request".to_string()));

        AppError::Validation {
            message_pt: format!("Valor inválido para {}", field),
            field,
            message,
        }
    }
}

impl From<ManifestError> for AppError {
    fn from(err: ManifestError) -> Self {
        if err.is_data_integrity() {
            AppError::DataIntegrity(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

/// Postgres error code of a failed statement, if any
pub fn pg_error_code(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|e| e.code())
        .map(|c| c.into_owned())
}

/// 23505
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    pg_error_code(err).as_deref() == Some("23505")
}

/// 23503
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    pg_error_code(err).as_deref() == Some("23503")
}

/// Serialization failure or deadlock: safe to retry the whole transaction
pub fn is_transient(err: &AppError) -> bool {
    match err {
        AppError::DatabaseError(e) => {
            matches!(pg_error_code(e).as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_pt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::TokenExpired | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StateConflict { .. } | AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::DataIntegrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DatabaseError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn detail(&self) -> ErrorDetail {
        match self {
            AppError::TokenExpired => ErrorDetail {
                code: "TOKEN_EXPIRED".to_string(),
                message_en: "Token has expired".to_string(),
                message_pt: "O token expirou".to_string(),
                field: None,
            },
            AppError::InvalidToken => ErrorDetail {
                code: "INVALID_TOKEN".to_string(),
                message_en: "Invalid token".to_string(),
                message_pt: "Token inválido".to_string(),
                field: None,
            },
            AppError::InsufficientPermissions { resource, action } => ErrorDetail {
                code: "INSUFFICIENT_PERMISSIONS".to_string(),
                message_en: format!("Permission denied: requires {}:{}", resource, action),
                message_pt: "Você não tem permissão para executar esta ação".to_string(),
                field: None,
            },
            AppError::Validation {
                field,
                message,
                message_pt,
            } => ErrorDetail {
                code: "VALIDATION_ERROR".to_string(),
                message_en: message.clone(),
                message_pt: message_pt.clone(),
                field: Some(field.clone()),
            },
            AppError::NotFound(resource) => ErrorDetail {
                code: "NOT_FOUND".to_string(),
                message_en: format!("{} not found", resource),
                message_pt: format!("{} não encontrado(a)", resource),
                field: None,
            },
            AppError::StateConflict {
                message, message_pt, ..
            } => ErrorDetail {
                code: "STATE_CONFLICT".to_string(),
                message_en: message.clone(),
                message_pt: message_pt.clone(),
                field: Some("status".to_string()),
            },
            AppError::Conflict {
                resource,
                message,
                message_pt,
            } => ErrorDetail {
                code: "CONFLICT".to_string(),
                message_en: message.clone(),
                message_pt: message_pt.clone(),
                field: Some(resource.clone()),
            },
            AppError::DataIntegrity(msg) => ErrorDetail {
                code: "DATA_INTEGRITY_ERROR".to_string(),
                message_en: msg.clone(),
                message_pt: format!("Dados inconsistentes: {}", msg),
                field: None,
            },
            AppError::DatabaseError(_) => ErrorDetail {
                code: "DATABASE_ERROR".to_string(),
                message_en: "A database error occurred".to_string(),
                message_pt: "Ocorreu um erro no banco de dados".to_string(),
                field: None,
            },
            AppError::Internal(_) => ErrorDetail {
                code: "INTERNAL_ERROR".to_string(),
                message_en: "An internal server error occurred".to_string(),
                message_pt: "Ocorreu um erro interno no servidor".to_string(),
                field: None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        (status, Json(ErrorResponse { error: self.detail() })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
