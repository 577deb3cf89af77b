//! Domain module
//!
//! Core domain types: identifiers, amounts, prices, offers and events.

pub mod amount;
pub mod context;
pub mod error;
pub mod events;
pub mod ids;
pub mod offer;
pub mod price;

pub use amount::{Amount, AmountError, Balance};
pub use context::OperationContext;
pub use error::DomainError;
pub use events::ExchangeEvent;
pub use ids::{CurrencyCode, UserId};
pub use offer::{Fill, MatchResult, OfferKey, SellOffer};
pub use price::{Price, PriceBand};
