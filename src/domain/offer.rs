//! Selling pool records and match results

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Amount, CurrencyCode, Price, UserId};

/// Standing sell offer, keyed by (seller, currency, price).
///
/// `amount` is the residual still for sale; it reaches zero once fully
/// consumed and the row stays until pruned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOffer {
    pub seller: UserId,
    pub currency: CurrencyCode,
    pub price: Price,
    pub amount: Decimal,
}

impl SellOffer {
    pub fn key(&self) -> OfferKey {
        OfferKey {
            seller: self.seller,
            currency: self.currency.clone(),
            price: self.price,
        }
    }
}

/// Primary key of a selling pool row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OfferKey {
    pub seller: UserId,
    pub currency: CurrencyCode,
    pub price: Price,
}

/// One (seller, amount taken, price) tuple of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub seller: UserId,
    pub amount: Amount,
    pub price: Price,
}

/// Ordered fills covering exactly the requested amount.
///
/// Only produced by the matching engine and only for a complete match;
/// a partial match is never represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    fills: Vec<Fill>,
}

impl MatchResult {
    pub(crate) fn new(fills: Vec<Fill>) -> Self {
        Self { fills }
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn into_fills(self) -> Vec<Fill> {
        self.fills
    }

    pub fn total(&self) -> Decimal {
        self.fills.iter().map(|f| f.amount.value()).sum()
    }

    pub fn len(&self) -> usize {
        self.fills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }
}

impl IntoIterator for MatchResult {
    type Item = Fill;
    type IntoIter = std::vec::IntoIter<Fill>;

    fn into_iter(self) -> Self::IntoIter {
        self.fills.into_iter()
    }
}
