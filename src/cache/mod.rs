//! Cache module
//!
//! Best-effort key-value bookkeeping that sits outside the consistency
//! critical path: session-token expiry timestamps and recent execution
//! prices per currency. Nothing here is read back by a settlement.

mod memory;
mod token;

use async_trait::async_trait;

pub use memory::MemoryCache;
pub use token::TokenCache;

/// Cache Result type
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by a cache backend
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Key not found: {0}")]
    NotFound(String),

    /// `increment` on a value that does not parse as an integer
    #[error("Value at {0} is not an integer")]
    NotAnInteger(String),

    #[error("Cannot parse cached value at {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// String key-value store without expiry.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Delete `keys`, returning how many existed.
    async fn remove(&self, keys: &[&str]) -> CacheResult<u64>;

    /// Add one to each integer value, starting missing keys at zero.
    /// Every key is attempted; the first failure is reported.
    async fn increment(&self, keys: &[&str]) -> CacheResult<()>;

    /// Prepend `value` to the list at `key`.
    async fn push_list(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Whole list at `key`, most recently pushed first. Empty when missing.
    async fn list(&self, key: &str) -> CacheResult<Vec<String>>;
}
