//! Store Errors
//!
//! Infrastructure failures raised by a store backend.

/// Errors that can occur in the balance store or selling pool
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A read or write was issued outside of a unit of work
    #[error("No active transaction")]
    NoActiveTransaction,

    /// Waiting for a lock took longer than the configured timeout
    #[error("Timed out waiting for lock on {0}")]
    LockTimeout(String),

    /// The handle already read the pool under a shared lock
    #[error("Selling pool must be locked before it is read in the same transaction")]
    PoolLockAfterRead,

    /// Commit would persist a negative balance or residual
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A row could not be mapped to a domain value
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    /// Check if this error came from lock contention
    pub fn is_contention(&self) -> bool {
        match self {
            StoreError::LockTimeout(_) => true,
            // 40P01 deadlock_detected, 55P03 lock_not_available
            StoreError::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40P01") | Some("55P03"))
            }
            _ => false,
        }
    }
}
