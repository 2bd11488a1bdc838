use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;
use thiserror::Error;

use crate::domain::errors::DomainError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    InsufficientStock(String),

    #[error("Cart is empty")]
    CartEmpty,

    #[error("{message}")]
    CouponInvalid { reason: &'static str, message: String },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::Conflict(_) => "conflict",
            AppError::InvalidState(_) => "invalid_state",
            AppError::InsufficientStock(_) => "insufficient_stock",
            AppError::CartEmpty => "cart_empty",
            AppError::CouponInvalid { .. } => "coupon_invalid",
            AppError::Forbidden(_) => "forbidden",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound(_) => AppError::NotFound(e.to_string()),
            DomainError::InvalidInput(msg) => AppError::InvalidArgument(msg),
            DomainError::Conflict(msg) => AppError::Conflict(msg),
            DomainError::InvalidState(msg) => AppError::InvalidState(msg),
            DomainError::InsufficientStock { .. } => AppError::InsufficientStock(e.to_string()),
            DomainError::EmptyCart => AppError::CartEmpty,
            DomainError::CouponRejected(reason) => AppError::CouponInvalid {
                reason: reason.code(),
                message: reason.to_string(),
            },
            DomainError::Forbidden(msg) => AppError::Forbidden(msg),
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::InvalidState(_) | AppError::InsufficientStock(_) => {
                StatusCode::CONFLICT
            }
            AppError::CartEmpty | AppError::CouponInvalid { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Internal(detail) => {
                log::error!("Internal error: {}", detail);
                json!({ "error": "Internal server error", "code": self.code() })
            }
            AppError::CouponInvalid { reason, message } => json!({
                "error": message,
                "code": self.code(),
                "reason": reason
            }),
            other => json!({ "error": other.to_string(), "code": other.code() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
