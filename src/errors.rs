use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::request_id;

/// Unified error type for all services. HTTP mapping lives in
/// `status_code()` so handlers never pick status codes themselves.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("rental order cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("vehicle is not in the required state: {0}")]
    VehicleStateConflict(String),

    #[error("rental order {0} already has an invoice")]
    DuplicateInvoice(Uuid),

    #[error("payment exceeds the outstanding balance: {0}")]
    OverpaymentNotAllowed(String),

    #[error("promotion usage limit reached: {0}")]
    UsageLimitReached(String),

    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("internal error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_)
            | ServiceError::OverpaymentNotAllowed(_)
            | ServiceError::UsageLimitReached(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidTransition { .. }
            | ServiceError::VehicleStateConflict(_)
            | ServiceError::DuplicateInvoice(_)
            | ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::DatabaseError(_) | ServiceError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable reason, exposed as `code` in error bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::ValidationError(_) => "validation_error",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::VehicleStateConflict(_) => "vehicle_state_conflict",
            ServiceError::DuplicateInvoice(_) => "duplicate_invoice",
            ServiceError::OverpaymentNotAllowed(_) => "overpayment_not_allowed",
            ServiceError::UsageLimitReached(_) => "usage_limit_reached",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::DatabaseError(_) | ServiceError::Other(_) => "internal_error",
        }
    }

    /// Message safe to expose to clients. Internal errors are masked.
    pub fn response_message(&self) -> String {
        match self {
            ServiceError::DatabaseError(_) | ServiceError::Other(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub timestamp: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
            code: self.reason().to_string(),
            message: self.response_message(),
            request_id: request_id::current(),
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}
