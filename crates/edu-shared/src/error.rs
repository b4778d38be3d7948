//! Error types for the EduAI progress core.
//!
//! Every engine operation returns `Result<_, EduError>`. The first four
//! variants are caller errors and are surfaced as structured responses;
//! `Storage` and `Queue` wrap collaborator failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EduError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),
}

impl EduError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EduError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EduError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        EduError::PreconditionFailed(msg.into())
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EduError::Validation(_) => "validation_error",
            EduError::InvalidTransition { .. } => "invalid_transition",
            EduError::PreconditionFailed(_) => "precondition_failed",
            EduError::NotFound { .. } => "not_found",
            EduError::Storage(_) => "storage_error",
            EduError::Queue(_) => "queue_error",
        }
    }

    /// HTTP-style status code used by the CLI and worker responses.
    pub fn code(&self) -> u16 {
        match self {
            EduError::Validation(_) => 400,
            EduError::InvalidTransition { .. } => 409,
            EduError::PreconditionFailed(_) => 412,
            EduError::NotFound { .. } => 404,
            EduError::Storage(_) => 500,
            EduError::Queue(_) => 503,
        }
    }

    /// Caller errors are recoverable by fixing the request.
    pub fn is_client_error(&self) -> bool {
        self.code() < 500
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                kind: self.kind().to_string(),
                code: self.code(),
                message: self.to_string(),
            },
        }
    }
}

/// Structured error as returned at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub code: u16,
    pub message: String,
}

pub type EduResult<T> = Result<T, EduError>;
