//! Service error taxonomy and its HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OrderServiceError {
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Insufficient stock for variant {variant_id}: requested {requested}")]
    InsufficientStock { variant_id: Uuid, requested: i32 },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, OrderServiceError>;

impl OrderServiceError {
    pub fn validation(field: impl Into<String>) -> Self {
        Self::Validation(vec![field.into()])
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock { .. } => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OrderServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Storage failures are logged in full but surfaced generically.
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "database error");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            OrderServiceError::validation("customer_name").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OrderServiceError::InsufficientStock {
                variant_id: Uuid::nil(),
                requested: 3
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            OrderServiceError::NotFound("order").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            OrderServiceError::InvalidTransition {
                from: "DELIVERED".into(),
                to: "PENDING".into()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let e = OrderServiceError::Validation(vec![
            "customer_name".into(),
            "customer_phone".into(),
        ]);
        assert_eq!(
            e.to_string(),
            "Validation failed: customer_name, customer_phone"
        );
    }
}
