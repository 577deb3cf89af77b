//! Registry module
//!
//! Reference data the exchange core reads but does not own: registered
//! users and the externally maintained unit value of each currency.

mod currencies;
mod users;

pub use currencies::{CurrencyQuote, CurrencyRegistry};
pub use users::{hash_credential, RegisteredUser, UserRegistry};

use crate::domain::DomainError;

/// Registry Result type
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Credential must not be empty")]
    EmptyCredential,

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
