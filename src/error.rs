//! Error handling module
//!
//! Centralized error type for exchange operations. Business outcomes
//! (missing funds, thin liquidity) and infrastructure failures share one
//! enum so callers can match on either without string inspection.

use rust_decimal::Decimal;

use crate::domain::DomainError;
use crate::store::StoreError;

/// Exchange-wide Result type
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Exchange error types
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    // Business outcomes
    /// A balance row or offer the operation needs does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    /// The pool cannot cover the request inside the price band
    #[error("Insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Decimal, available: Decimal },

    #[error(transparent)]
    Domain(#[from] DomainError),

    // Infrastructure failures
    #[error("Store failure: {0}")]
    StoreFailure(#[from] StoreError),

    /// The caller's deadline expired before the operation finished
    #[error("Operation timed out")]
    Timeout,
}

impl ExchangeError {
    /// Typed business result as opposed to an infrastructure failure.
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            ExchangeError::NotFound(_)
                | ExchangeError::InsufficientFunds { .. }
                | ExchangeError::InsufficientLiquidity { .. }
                | ExchangeError::Domain(_)
        )
    }

    pub fn is_store_failure(&self) -> bool {
        matches!(self, ExchangeError::StoreFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_business_outcomes() {
        let err = ExchangeError::InsufficientLiquidity {
            requested: dec!(25),
            available: dec!(20),
        };
        assert!(err.is_business_outcome());
        assert!(!err.is_store_failure());
        assert_eq!(err.to_string(), "Insufficient liquidity: requested 25, available 20");
    }

    #[test]
    fn test_store_failure_conversion() {
        let err: ExchangeError = StoreError::NoActiveTransaction.into();
        assert!(err.is_store_failure());
        assert!(!err.is_business_outcome());
        assert!(!ExchangeError::Timeout.is_business_outcome());
    }

    #[test]
    fn test_domain_error_conversion() {
        let err: ExchangeError = DomainError::SameUserTransfer.into();
        assert!(err.is_business_outcome());
        assert!(matches!(err, ExchangeError::Domain(DomainError::SameUserTransfer)));
    }
}
