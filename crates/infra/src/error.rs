//! Persistence and checkout error types.

use thiserror::Error;

use storefront_core::{DomainError, ProductId};
use storefront_orders::{OrderError, OrderStatus, PricingError};

/// Storage-level failure.
///
/// SQLx errors are mapped by PostgreSQL SQLSTATE:
///
/// | SQLSTATE | StoreError | Scenario |
/// |----------|------------|----------|
/// | `23505` | `UniqueViolation` | order number or payment reference already bound |
/// | `40001` | `Conflict` | serialization failure under `REPEATABLE READ` |
/// | `40P01` | `Conflict` | deadlock detected |
/// | other | `Database` | anything else |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    /// Transient write conflict; the unit of work may be retried.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A stored row could not be decoded into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub fn is_unique_violation(&self, constraint: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint: c } if c == constraint)
    }
}

/// Failures surfaced by checkout operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Unknown product or order, or an order the caller does not own.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "insufficient stock for '{product_name}' ({product_id}): requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: i64,
        available: i64,
    },

    #[error("payment reference '{reference}' is already bound to an order")]
    DuplicatePayment { reference: String },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("forbidden")]
    Forbidden,

    /// Transient write conflict that outlived the retry budget.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Machine-readable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::NotFound(_) => "not_found",
            CheckoutError::InvalidInput(_) => "invalid_input",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::DuplicatePayment { .. } => "duplicate_payment",
            CheckoutError::InvalidTransition { .. } => "invalid_transition",
            CheckoutError::Forbidden => "forbidden",
            CheckoutError::Conflict(_) => "conflict",
            CheckoutError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => CheckoutError::Conflict(msg),
            StoreError::UniqueViolation { constraint } => {
                CheckoutError::Conflict(format!("unique constraint violated: {constraint}"))
            }
            other => CheckoutError::Internal(other.to_string()),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                CheckoutError::InvalidInput(msg)
            }
            DomainError::NotFound(subject) => CheckoutError::NotFound(subject),
            DomainError::Conflict(msg) => CheckoutError::Conflict(msg),
            DomainError::InvariantViolation(msg) => CheckoutError::Internal(msg),
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(msg) => CheckoutError::InvalidInput(msg),
            OrderError::InvalidTransition { from, to } => {
                CheckoutError::InvalidTransition { from, to }
            }
            OrderError::Domain(e) => e.into(),
        }
    }
}

impl From<PricingError> for CheckoutError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::UnknownProduct(id) => CheckoutError::NotFound(format!("product {id}")),
            other => CheckoutError::InvalidInput(other.to_string()),
        }
    }
}
