use thiserror::Error;

use storefront_core::DomainError;

use crate::status::OrderStatus;

/// Failures raised by the order aggregate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// A supplied field failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested status is not reachable from the current one.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl OrderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
