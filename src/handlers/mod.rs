//! Command Handlers module
//!
//! Handlers that run one exchange operation end to end: open a
//! transaction, drive the core components, finalize, then announce.

mod commands;
mod offer_handler;
mod settlement_handler;


pub use commands::*;
pub use offer_handler::OfferHandler;
pub use settlement_handler::SettlementHandler;
