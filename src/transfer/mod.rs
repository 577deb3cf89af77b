//! Transfer module
//!
//! Atomic balance moves between two users.

mod executor;

pub use executor::TransferExecutor;
