//! Settlement Handler
//!
//! Matches a buy request against the selling pool and settles every fill
//! in one transaction: the offer is consumed, the seller's funds move to
//! the buyer and, with a quote currency, the buyer pays the seller. The
//! commit at the end is the only finalize point; any failure before it
//! leaves the store untouched.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::TokenCache;
use crate::domain::{AmountError, DomainError, ExchangeEvent, MatchResult, OperationContext, PriceBand};
use crate::error::{ExchangeError, ExchangeResult};
use crate::matching::MatchingEngine;
use crate::notify::ExchangePublisher;
use crate::selling_pool::SellingPoolManager;
use crate::store::{rollback_quietly, Store, TransactionControl};
use crate::transfer::TransferExecutor;

use super::{BuyCommand, SettlementReceipt};

/// Handler for buy requests
pub struct SettlementHandler<S: Store> {
    store: S,
    matching: MatchingEngine,
    transfers: TransferExecutor,
    selling_pool: SellingPoolManager,
    publisher: Arc<dyn ExchangePublisher>,
    tokens: TokenCache,
}

impl<S: Store> SettlementHandler<S> {
    pub fn new(store: S, publisher: Arc<dyn ExchangePublisher>, tokens: TokenCache) -> Self {
        Self {
            store,
            matching: MatchingEngine::new(),
            transfers: TransferExecutor::new(),
            selling_pool: SellingPoolManager::new(),
            publisher,
            tokens,
        }
    }

    /// Settle a buy request and announce it.
    pub async fn settle_buy(
        &self,
        command: BuyCommand,
        context: &OperationContext,
    ) -> ExchangeResult<SettlementReceipt> {
        let receipt = self.settle(command, context).await?;
        self.announce(&receipt, context).await;
        Ok(receipt)
    }

    /// [`settle_buy`](Self::settle_buy) bounded by `deadline`.
    ///
    /// On expiry the in-flight settlement is dropped together with its
    /// transaction handle, which rolls the unit of work back. The deadline
    /// covers the transactional part only; announcing a committed
    /// settlement is never cut short.
    pub async fn settle_buy_with_deadline(
        &self,
        command: BuyCommand,
        context: &OperationContext,
        deadline: Duration,
    ) -> ExchangeResult<SettlementReceipt> {
        let buyer = command.buyer;
        let receipt = match tokio::time::timeout(deadline, self.settle(command, context)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    buyer = %buyer,
                    deadline_ms = deadline.as_millis() as u64,
                    correlation_id = ?context.correlation_id,
                    "Settlement deadline expired"
                );
                return Err(ExchangeError::Timeout);
            }
        };

        self.announce(&receipt, context).await;
        Ok(receipt)
    }

    async fn settle(
        &self,
        command: BuyCommand,
        context: &OperationContext,
    ) -> ExchangeResult<SettlementReceipt> {
        command.validate()?;

        let mut tx = self.store.transaction().await?;
        let (matched, quote_paid) = match self.execute(&mut tx, &command).await {
            Ok(outcome) => outcome,
            Err(e) => {
                rollback_quietly(&mut tx).await;
                if e.is_store_failure() {
                    tracing::warn!(
                        buyer = %command.buyer,
                        currency = %command.currency,
                        error = %e,
                        correlation_id = ?context.correlation_id,
                        "Settlement failed in the store"
                    );
                } else {
                    tracing::info!(
                        buyer = %command.buyer,
                        currency = %command.currency,
                        amount = %command.amount,
                        error = %e,
                        correlation_id = ?context.correlation_id,
                        "Settlement rejected"
                    );
                }
                return Err(e);
            }
        };

        let receipt = SettlementReceipt {
            settlement_id: Uuid::new_v4(),
            buyer: command.buyer,
            currency: command.currency,
            total: matched.total(),
            fills: matched.into_fills(),
            quote_paid: command.quote_currency.as_ref().map(|_| quote_paid),
            quote_currency: command.quote_currency,
        };

        tracing::info!(
            settlement_id = %receipt.settlement_id,
            buyer = %receipt.buyer,
            currency = %receipt.currency,
            total = %receipt.total,
            fills = receipt.fills.len(),
            correlation_id = ?context.correlation_id,
            "Settlement committed"
        );
        Ok(receipt)
    }

    /// Lock the pool, match, move funds for every fill, commit.
    async fn execute(
        &self,
        tx: &mut S::Tx,
        command: &BuyCommand,
    ) -> ExchangeResult<(MatchResult, Decimal)> {
        tx.lock_selling_pool().await?;

        let matched = self
            .matching
            .find_sellers_excluding(tx, &command.currency, command.amount, &command.band, command.buyer)
            .await?;

        let mut quote_paid = Decimal::ZERO;
        for fill in matched.fills() {
            self.selling_pool
                .consume_offer(tx, &command.currency, fill.seller, fill.amount, &PriceBand::exact(fill.price))
                .await?;
            self.transfers
                .send_money(tx, fill.seller, command.buyer, &command.currency, fill.amount)
                .await?;

            if let Some(quote) = &command.quote_currency {
                let cost = fill.amount.priced_at(fill.price.value()).map_err(|e| match e {
                    AmountError::NotPositive(_) => DomainError::QuoteBelowPrecision {
                        amount: fill.amount.value(),
                        price: fill.price.value(),
                    },
                    other => DomainError::from(other),
                })?;
                self.transfers
                    .send_money(tx, command.buyer, fill.seller, quote, cost)
                    .await?;
                quote_paid += cost.value();
            }
        }

        tx.commit().await?;
        Ok((matched, quote_paid))
    }

    /// Best effort: the settlement is already committed.
    async fn announce(&self, receipt: &SettlementReceipt, context: &OperationContext) {
        let event = ExchangeEvent::Settled {
            settlement_id: receipt.settlement_id,
            buyer: receipt.buyer,
            currency: receipt.currency.clone(),
            fills: receipt.fills.clone(),
            quote_currency: receipt.quote_currency.clone(),
            settled_at: Utc::now(),
        };
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(
                settlement_id = %receipt.settlement_id,
                error = %e,
                correlation_id = ?context.correlation_id,
                "Failed to publish settlement"
            );
        }

        for fill in &receipt.fills {
            if let Err(e) = self.tokens.record_operation(&receipt.currency, fill.price).await {
                tracing::warn!(
                    settlement_id = %receipt.settlement_id,
                    error = %e,
                    "Failed to record operation price"
                );
            }
        }
    }
}
