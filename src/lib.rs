//! currency_exchange Library
//!
//! Transactional core of a multi-currency exchange: balances, a selling pool
//! of standing offers, price-band matching and atomic settlement.

pub mod cache;
pub mod domain;
pub mod handlers;
pub mod jobs;
pub mod matching;
pub mod notify;
pub mod registry;
pub mod selling_pool;
pub mod store;
pub mod transfer;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, DomainError, ExchangeEvent, OperationContext};
pub use error::{ExchangeError, ExchangeResult};
