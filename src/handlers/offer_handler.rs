//! Offer Handler
//!
//! Places and withdraws sell offers on behalf of a seller.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::{CurrencyCode, ExchangeEvent, OperationContext, Price, UserId};
use crate::error::ExchangeResult;
use crate::notify::ExchangePublisher;
use crate::selling_pool::SellingPoolManager;
use crate::store::{rollback_quietly, Store, TransactionControl};

use super::{OfferCommand, OfferResult};

/// Handler for selling pool liquidity
pub struct OfferHandler<S: Store> {
    store: S,
    selling_pool: SellingPoolManager,
    publisher: Arc<dyn ExchangePublisher>,
}

impl<S: Store> OfferHandler<S> {
    pub fn new(store: S, publisher: Arc<dyn ExchangePublisher>) -> Self {
        Self {
            store,
            selling_pool: SellingPoolManager::new(),
            publisher,
        }
    }

    /// Escrow the command's amount into the pool and announce the offer.
    pub async fn place_offer(
        &self,
        command: OfferCommand,
        context: &OperationContext,
    ) -> ExchangeResult<OfferResult> {
        let (amount, price) = command.parse()?;

        let mut tx = self.store.transaction().await?;
        let residual = self
            .selling_pool
            .add_offer(&mut tx, &command.currency, command.seller, amount, price)
            .await?;

        self.announce(
            ExchangeEvent::OfferPlaced {
                seller: command.seller,
                currency: command.currency.clone(),
                amount: amount.value(),
                price: price.value(),
                placed_at: Utc::now(),
            },
            context,
        )
        .await;

        Ok(OfferResult {
            seller: command.seller,
            currency: command.currency,
            price,
            amount: amount.value(),
            residual,
        })
    }

    /// Return the whole residual of one offer to the seller.
    pub async fn withdraw_offer(
        &self,
        seller: UserId,
        currency: CurrencyCode,
        price: Price,
        context: &OperationContext,
    ) -> ExchangeResult<OfferResult> {
        let mut tx = self.store.transaction().await?;
        let released = self
            .selling_pool
            .withdraw_offer(&mut tx, &currency, seller, price)
            .await?;

        if let Err(e) = tx.commit().await {
            rollback_quietly(&mut tx).await;
            return Err(e.into());
        }

        tracing::info!(
            seller = %seller,
            currency = %currency,
            price = %price,
            amount = %released,
            correlation_id = ?context.correlation_id,
            "Offer withdrawn"
        );

        self.announce(
            ExchangeEvent::OfferWithdrawn {
                seller,
                currency: currency.clone(),
                amount: released,
                price: price.value(),
                withdrawn_at: Utc::now(),
            },
            context,
        )
        .await;

        Ok(OfferResult {
            seller,
            currency,
            price,
            amount: released,
            residual: Decimal::ZERO,
        })
    }

    async fn announce(&self, event: ExchangeEvent, context: &OperationContext) {
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(
                event_type = event.event_type(),
                error = %e,
                correlation_id = ?context.correlation_id,
                "Failed to publish offer event"
            );
        }
    }
}
