//! Prices and price bands

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::DomainError;

/// Maximum decimal places for a price
const PRICE_SCALE: u32 = 8;

/// Unit price of an offer, strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO || value.scale() > PRICE_SCALE {
            return Err(DomainError::InvalidPrice(value));
        }
        // normalized so that 1.0 and 1.00 address the same offer row
        Ok(Self(value.normalize()))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Price {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Price::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive `[floor, ceiling]` range of prices a buyer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBand")]
pub struct PriceBand {
    floor: Decimal,
    ceiling: Decimal,
}

/// Wire shape of a band before its bounds are checked.
#[derive(Deserialize)]
struct RawBand {
    floor: Decimal,
    ceiling: Decimal,
}

impl TryFrom<RawBand> for PriceBand {
    type Error = DomainError;

    fn try_from(raw: RawBand) -> Result<Self, Self::Error> {
        PriceBand::new(raw.floor, raw.ceiling)
    }
}

impl PriceBand {
    pub fn new(floor: Decimal, ceiling: Decimal) -> Result<Self, DomainError> {
        if floor < Decimal::ZERO || floor > ceiling {
            return Err(DomainError::InvalidPriceBand { floor, ceiling });
        }
        Ok(Self { floor, ceiling })
    }

    /// Band containing exactly one price point.
    pub fn exact(price: Price) -> Self {
        Self {
            floor: price.value(),
            ceiling: price.value(),
        }
    }

    /// Band of `spot ± spot * tolerance`, clamped at zero.
    ///
    /// The spot price is supplied by the caller; this core never looks it up.
    pub fn around(spot: Decimal, tolerance: Decimal) -> Result<Self, DomainError> {
        if spot <= Decimal::ZERO || tolerance < Decimal::ZERO {
            return Err(DomainError::InvalidPriceBand {
                floor: spot,
                ceiling: spot,
            });
        }
        let delta = spot * tolerance;
        Self::new((spot - delta).max(Decimal::ZERO), spot + delta)
    }

    pub fn floor(&self) -> Decimal {
        self.floor
    }

    pub fn ceiling(&self) -> Decimal {
        self.ceiling
    }

    pub fn contains(&self, price: Price) -> bool {
        price.value() >= self.floor && price.value() <= self.ceiling
    }
}

impl fmt::Display for PriceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.floor, self.ceiling)
    }
}
