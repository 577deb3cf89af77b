//! Command definitions
//!
//! Commands represent intentions to change the exchange state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Amount, CurrencyCode, DomainError, Fill, Price, PriceBand, UserId};

// =========================================================================
// BuyCommand
// =========================================================================

/// Buy `amount` of `currency` from the selling pool at prices inside `band`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyCommand {
    pub buyer: UserId,
    pub currency: CurrencyCode,
    pub amount: Amount,
    pub band: PriceBand,
    /// When set, the buyer pays each seller `amount × price` of this currency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_currency: Option<CurrencyCode>,
}

impl BuyCommand {
    pub fn new(buyer: UserId, currency: CurrencyCode, amount: Amount, band: PriceBand) -> Self {
        Self {
            buyer,
            currency,
            amount,
            band,
            quote_currency: None,
        }
    }

    pub fn with_quote_currency(mut self, quote_currency: CurrencyCode) -> Self {
        self.quote_currency = Some(quote_currency);
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quote_currency.as_ref() == Some(&self.currency) {
            return Err(DomainError::InvalidCurrency(format!(
                "quote currency equals traded currency {}",
                self.currency
            )));
        }
        Ok(())
    }
}

// =========================================================================
// OfferCommand
// =========================================================================

/// Put `amount` of `currency` up for sale at `price`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferCommand {
    pub seller: UserId,
    pub currency: CurrencyCode,
    /// Amount to escrow (as string for precise decimal)
    pub amount: String,
    pub price: Decimal,
}

impl OfferCommand {
    pub fn new(seller: UserId, currency: CurrencyCode, amount: String, price: Decimal) -> Self {
        Self {
            seller,
            currency,
            amount,
            price,
        }
    }

    /// Parse the amount and price into their validated forms.
    pub fn parse(&self) -> Result<(Amount, Price), DomainError> {
        let amount: Amount = self.amount.parse()?;
        let price = Price::new(self.price)?;
        Ok((amount, price))
    }
}

/// Result of a successful settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub settlement_id: Uuid,
    pub buyer: UserId,
    pub currency: CurrencyCode,
    pub fills: Vec<Fill>,
    pub total: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_currency: Option<CurrencyCode>,
    /// Total paid in the quote currency, when one was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_paid: Option<Decimal>,
}

/// Result of placing or withdrawing an offer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferResult {
    pub seller: UserId,
    pub currency: CurrencyCode,
    pub price: Price,
    /// Amount escrowed or released by this operation
    pub amount: Decimal,
    /// Residual of the offer afterwards
    pub residual: Decimal,
}
