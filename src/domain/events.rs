//! Exchange Events
//!
//! Facts broadcast to other services once the transaction that produced
//! them has committed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CurrencyCode, Fill, UserId};

/// Completed exchange operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExchangeEvent {
    /// Liquidity was escrowed into the selling pool
    OfferPlaced {
        seller: UserId,
        currency: CurrencyCode,
        amount: Decimal,
        price: Decimal,
        placed_at: DateTime<Utc>,
    },

    /// An offer's residual was returned to the seller
    OfferWithdrawn {
        seller: UserId,
        currency: CurrencyCode,
        amount: Decimal,
        price: Decimal,
        withdrawn_at: DateTime<Utc>,
    },

    /// A buy request was matched and settled
    Settled {
        settlement_id: Uuid,
        buyer: UserId,
        currency: CurrencyCode,
        fills: Vec<Fill>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        quote_currency: Option<CurrencyCode>,
        settled_at: DateTime<Utc>,
    },
}

impl ExchangeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ExchangeEvent::OfferPlaced { .. } => "OfferPlaced",
            ExchangeEvent::OfferWithdrawn { .. } => "OfferWithdrawn",
            ExchangeEvent::Settled { .. } => "Settled",
        }
    }

    pub fn currency(&self) -> &CurrencyCode {
        match self {
            ExchangeEvent::OfferPlaced { currency, .. }
            | ExchangeEvent::OfferWithdrawn { currency, .. }
            | ExchangeEvent::Settled { currency, .. } => currency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, Price};
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_is_tagged() {
        let event = ExchangeEvent::OfferPlaced {
            seller: UserId::new(7),
            currency: CurrencyCode::new("EUR").unwrap(),
            amount: dec!(5),
            price: dec!(1.1),
            placed_at: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OfferPlaced");
        assert_eq!(json["seller"], 7);
        assert_eq!(json["currency"], "EUR");
        assert_eq!(event.event_type(), "OfferPlaced");
    }

    #[test]
    fn test_settled_event_decodes() {
        let event = ExchangeEvent::Settled {
            settlement_id: Uuid::new_v4(),
            buyer: UserId::new(1),
            currency: CurrencyCode::new("BTC").unwrap(),
            fills: vec![Fill {
                seller: UserId::new(2),
                amount: Amount::new(dec!(0.5)).unwrap(),
                price: Price::new(dec!(30000)).unwrap(),
            }],
            quote_currency: None,
            settled_at: Utc::now(),
        };

        let text = serde_json::to_string(&event).unwrap();
        assert!(!text.contains("quote_currency"));
        let decoded: ExchangeEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.currency().as_str(), "BTC");
    }
}
