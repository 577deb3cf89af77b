//! Selling Pool Manager
//!
//! Offers hold escrowed funds: placing one moves the amount out of the
//! seller's spendable balance, consuming or withdrawing moves it back.
//! The sum of a currency's balances and offer residuals is therefore
//! unchanged by every operation here.

use rust_decimal::Decimal;

use crate::domain::{Amount, CurrencyCode, Price, PriceBand, UserId};
use crate::error::{ExchangeError, ExchangeResult};
use crate::store::{rollback_quietly, ExchangeTransaction};

/// Writes to the selling pool. The only writer of offer rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SellingPoolManager;

impl SellingPoolManager {
    pub fn new() -> Self {
        Self
    }

    /// Escrow `amount` of the seller's balance into the offer at `price`,
    /// then commit.
    ///
    /// Offers at an identical (seller, currency, price) are summed. Returns
    /// the offer's new residual.
    pub async fn add_offer<T>(
        &self,
        tx: &mut T,
        currency: &CurrencyCode,
        seller: UserId,
        amount: Amount,
        price: Price,
    ) -> ExchangeResult<Decimal>
    where
        T: ExchangeTransaction + ?Sized,
    {
        let residual = match self.escrow(tx, currency, seller, amount, price).await {
            Ok(residual) => residual,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e);
            }
        };

        tx.commit().await?;

        tracing::info!(
            seller = %seller,
            currency = %currency,
            price = %price,
            amount = %amount,
            residual = %residual,
            "Offer placed"
        );
        Ok(residual)
    }

    async fn escrow<T>(
        &self,
        tx: &mut T,
        currency: &CurrencyCode,
        seller: UserId,
        amount: Amount,
        price: Price,
    ) -> ExchangeResult<Decimal>
    where
        T: ExchangeTransaction + ?Sized,
    {
        tx.lock_selling_pool().await?;

        let residual = tx.increment_offer(seller, currency, price, amount.value()).await?;

        let available = tx
            .balance_for_update(seller, currency)
            .await?
            .unwrap_or(Decimal::ZERO);
        if available < amount.value() {
            return Err(ExchangeError::InsufficientFunds {
                required: amount.value(),
                available,
            });
        }
        tx.write_balance(seller, currency, available - amount.value()).await?;

        Ok(residual)
    }

    /// Take `amount` out of the seller's cheapest offer in `band` that can
    /// cover it and return it to the seller's spendable balance. Does not
    /// commit.
    ///
    /// Returns the offer's new residual.
    ///
    /// # Errors
    /// - `NotFound` when the seller has no offer in `band`
    /// - `InsufficientFunds` when no single offer in `band` covers `amount`
    pub async fn consume_offer<T>(
        &self,
        tx: &mut T,
        currency: &CurrencyCode,
        seller: UserId,
        amount: Amount,
        band: &PriceBand,
    ) -> ExchangeResult<Decimal>
    where
        T: ExchangeTransaction + ?Sized,
    {
        let result = self.consume(tx, currency, seller, amount, band).await;
        if result.is_err() {
            rollback_quietly(tx).await;
        }
        result
    }

    async fn consume<T>(
        &self,
        tx: &mut T,
        currency: &CurrencyCode,
        seller: UserId,
        amount: Amount,
        band: &PriceBand,
    ) -> ExchangeResult<Decimal>
    where
        T: ExchangeTransaction + ?Sized,
    {
        tx.begin().await?;

        let offers = tx.seller_offers_in_band(seller, currency, band).await?;
        if offers.is_empty() {
            return Err(ExchangeError::NotFound(format!(
                "{} offer of user {} in {}",
                currency, seller, band
            )));
        }

        let Some(offer) = offers.iter().find(|o| o.amount >= amount.value()) else {
            let largest = offers.iter().map(|o| o.amount).max().unwrap_or(Decimal::ZERO);
            return Err(ExchangeError::InsufficientFunds {
                required: amount.value(),
                available: largest,
            });
        };

        let residual = tx
            .increment_offer(seller, currency, offer.price, -amount.value())
            .await?;
        tx.increment_balance(seller, currency, amount.value()).await?;

        tracing::debug!(
            seller = %seller,
            currency = %currency,
            price = %offer.price,
            amount = %amount,
            residual = %residual,
            "Offer consumed"
        );
        Ok(residual)
    }

    /// Return the whole residual of the offer at `price` to the seller.
    /// Does not commit. Returns the amount released.
    pub async fn withdraw_offer<T>(
        &self,
        tx: &mut T,
        currency: &CurrencyCode,
        seller: UserId,
        price: Price,
    ) -> ExchangeResult<Decimal>
    where
        T: ExchangeTransaction + ?Sized,
    {
        let result = self.release(tx, currency, seller, price).await;
        if result.is_err() {
            rollback_quietly(tx).await;
        }
        result
    }

    async fn release<T>(
        &self,
        tx: &mut T,
        currency: &CurrencyCode,
        seller: UserId,
        price: Price,
    ) -> ExchangeResult<Decimal>
    where
        T: ExchangeTransaction + ?Sized,
    {
        tx.begin().await?;

        let offer = tx
            .seller_offers_in_band(seller, currency, &PriceBand::exact(price))
            .await?
            .into_iter()
            .find(|o| o.amount > Decimal::ZERO)
            .ok_or_else(|| {
                ExchangeError::NotFound(format!("{} offer of user {} at {}", currency, seller, price))
            })?;

        tx.increment_offer(seller, currency, price, -offer.amount).await?;
        tx.increment_balance(seller, currency, offer.amount).await?;

        tracing::debug!(
            seller = %seller,
            currency = %currency,
            price = %price,
            amount = %offer.amount,
            "Offer withdrawn"
        );
        Ok(offer.amount)
    }
}
