//! # API Errors
//!
//! Every failure leaves as `{"error": {"code", "message", ...}}` with a
//! matching HTTP status.
//!
//! ```text
//! ┌──────────────────────────┬────────┬──────────────────────────┐
//! │ Source                   │ Status │ code                     │
//! ├──────────────────────────┼────────┼──────────────────────────┤
//! │ missing/invalid token    │  401   │ UNAUTHORIZED             │
//! │ policy denies            │  403   │ FORBIDDEN                │
//! │ ValidationError          │  400   │ VALIDATION_ERROR         │
//! │ unknown id in path       │  404   │ NOT_FOUND                │
//! │ ProductNotFound          │  404   │ PRODUCT_NOT_FOUND        │
//! │ UNIQUE violation         │  409   │ DUPLICATE                │
//! │ InsufficientStock        │  409   │ INSUFFICIENT_STOCK       │
//! │ InvalidStateTransition   │  409   │ INVALID_STATE_TRANSITION │
//! │ settings row missing     │  503   │ NOT_CONFIGURED           │
//! │ anything else            │  500   │ INTERNAL_ERROR           │
//! └──────────────────────────┴────────┴──────────────────────────┘
//! ```

use apothecary_core::{Action, CoreError, Role, StockShortage, ValidationError};
use apothecary_db::{DbError, FulfillmentError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("Role {role} may not {action:?}")]
    Forbidden { role: Role, action: Action },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Duplicate {0}")]
    Duplicate(String),

    #[error("Insufficient stock")]
    InsufficientStock(Vec<StockShortage>),

    #[error("{0}")]
    InvalidStateTransition(String),

    #[error("Pharmacy settings are not configured")]
    NotConfigured,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        ApiError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } | ApiError::ProductNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Duplicate(_) | ApiError::InsufficientStock(_) | ApiError::InvalidStateTransition(_) => {
                StatusCode::CONFLICT
            }
            ApiError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden { .. } => "FORBIDDEN",
            ApiError::Validation(_) | ApiError::BadRequest(_) => "VALIDATION_ERROR",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            ApiError::Duplicate(_) => "DUPLICATE",
            ApiError::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            ApiError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            ApiError::NotConfigured => "NOT_CONFIGURED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shortages: Vec<StockShortage>,
}

fn validation_field(err: &ValidationError) -> &str {
    match err {
        ValidationError::Required { field }
        | ValidationError::TooLong { field, .. }
        | ValidationError::OutOfRange { field, .. }
        | ValidationError::MustBePositive { field }
        | ValidationError::MustNotBeNegative { field }
        | ValidationError::InvalidFormat { field, .. } => field,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            // Internals stay in the log
            ApiError::Internal(detail) => {
                error!(detail = %detail, "Request failed");
                "An internal error occurred".to_string()
            }
            other => {
                warn!(code = other.code(), error = %other, "Request rejected");
                other.to_string()
            }
        };

        let field = match &self {
            ApiError::Validation(err) => Some(validation_field(err).to_string()),
            _ => None,
        };

        let code = self.code();
        let shortages = match self {
            ApiError::InsufficientStock(shortages) => shortages,
            _ => Vec::new(),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code,
                message,
                field,
                shortages,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => ApiError::ProductNotFound(id),
            CoreError::InsufficientStock(shortages) => ApiError::InsufficientStock(shortages),
            e @ CoreError::InvalidStateTransition { .. } => ApiError::InvalidStateTransition(e.to_string()),
            CoreError::Validation(e) => ApiError::Validation(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::NotFound { entity, id },
            DbError::UniqueViolation { field, .. } => ApiError::Duplicate(field),
            DbError::ForeignKeyViolation { .. } => {
                ApiError::BadRequest("Request refers to a record that does not exist".to_string())
            }
            DbError::Validation(e) => ApiError::Validation(e),
            DbError::Core(e) => e.into(),
            DbError::NotConfigured => ApiError::NotConfigured,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::Validation(e) => ApiError::Validation(e),
            FulfillmentError::ProductNotFound(id) => ApiError::ProductNotFound(id),
            FulfillmentError::InsufficientStock(shortages) => ApiError::InsufficientStock(shortages),
            FulfillmentError::DocumentNotFound { document, id } => ApiError::NotFound { entity: document, id },
            e @ FulfillmentError::InvalidStateTransition { .. } => ApiError::InvalidStateTransition(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Result type alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let shortage = ApiError::from(FulfillmentError::InsufficientStock(vec![]));
        assert_eq!(shortage.status(), StatusCode::CONFLICT);
        assert_eq!(shortage.code(), "INSUFFICIENT_STOCK");

        let missing = ApiError::from(DbError::NotConfigured);
        assert_eq!(missing.status(), StatusCode::SERVICE_UNAVAILABLE);

        let dup = ApiError::from(DbError::duplicate("products.sku", "X"));
        assert_eq!(dup.status(), StatusCode::CONFLICT);
        assert_eq!(dup.code(), "DUPLICATE");

        let internal = ApiError::from(FulfillmentError::NumberingConflict {
            number: "INV202610160001".to_string(),
        });
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_names_the_field() {
        let err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        assert_eq!(validation_field(&err), "quantity");
    }
}
