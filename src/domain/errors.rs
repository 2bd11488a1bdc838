use std::fmt;

use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

/// Why a coupon code was refused. Checks run in declaration order and the
/// first failing one wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponRejection {
    NotFound,
    NotOwner,
    AlreadyUsed,
    Expired,
    BelowMinimumPurchase { minimum: BigDecimal },
}

impl CouponRejection {
    /// Stable machine-readable reason, sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::NotFound => "not_found",
            CouponRejection::NotOwner => "not_owner",
            CouponRejection::AlreadyUsed => "already_used",
            CouponRejection::Expired => "expired",
            CouponRejection::BelowMinimumPurchase { .. } => "below_minimum_purchase",
        }
    }
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouponRejection::NotFound => write!(f, "coupon not found"),
            CouponRejection::NotOwner => write!(f, "coupon belongs to another user"),
            CouponRejection::AlreadyUsed => write!(f, "coupon already used"),
            CouponRejection::Expired => write!(f, "coupon expired"),
            CouponRejection::BelowMinimumPurchase { minimum } => {
                write!(f, "minimum purchase of {minimum} not reached")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Coupon rejected: {0}")]
    CouponRejected(CouponRejection),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(what: impl fmt::Display) -> Self {
        DomainError::NotFound(what.to_string())
    }
}
