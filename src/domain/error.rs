//! Domain Error Types
//!
//! Validation failures that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::AmountError;

/// Input validation errors for exchange operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),

    #[error("Invalid price band [{floor}, {ceiling}]")]
    InvalidPriceBand { floor: Decimal, ceiling: Decimal },

    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// A fill whose quote cost rounds to zero at amount precision
    #[error("Quote cost of {amount} at {price} is below the smallest payable amount")]
    QuoteBelowPrecision { amount: Decimal, price: Decimal },

    /// Sender and receiver are the same user
    #[error("Cannot transfer to the same user")]
    SameUserTransfer,
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        DomainError::InvalidAmount(err.to_string())
    }
}
