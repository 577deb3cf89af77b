//! Transfer Executor
//!
//! Debits a sender and credits a receiver inside the caller's unit of work.

use crate::domain::{Amount, Balance, CurrencyCode, DomainError, UserId};
use crate::error::{ExchangeError, ExchangeResult};
use crate::store::{rollback_quietly, BalanceStore};

/// Moves funds between balances.
///
/// The executor never commits. On any failure it rolls the caller's
/// transaction back before returning, so a multi-step settlement cannot
/// commit half of its writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferExecutor;

impl TransferExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Move `amount` of `currency` from `sender` to `receiver`.
    ///
    /// # Errors
    /// - `NotFound` when the sender has no balance row in `currency`
    /// - `InsufficientFunds` when the sender's balance is below `amount`
    /// - `Domain(SameUserTransfer)` when sender and receiver are the same
    pub async fn send_money<T>(
        &self,
        tx: &mut T,
        sender: UserId,
        receiver: UserId,
        currency: &CurrencyCode,
        amount: Amount,
    ) -> ExchangeResult<()>
    where
        T: BalanceStore + ?Sized,
    {
        let result = self.transfer(tx, sender, receiver, currency, amount).await;
        if let Err(e) = &result {
            tracing::debug!(error = %e, sender = %sender, receiver = %receiver, "Transfer failed");
            rollback_quietly(tx).await;
        }
        result
    }

    async fn transfer<T>(
        &self,
        tx: &mut T,
        sender: UserId,
        receiver: UserId,
        currency: &CurrencyCode,
        amount: Amount,
    ) -> ExchangeResult<()>
    where
        T: BalanceStore + ?Sized,
    {
        if sender == receiver {
            return Err(DomainError::SameUserTransfer.into());
        }

        tx.begin().await?;

        let available = tx
            .balance_for_update(sender, currency)
            .await?
            .ok_or_else(|| ExchangeError::NotFound(format!("{} balance of user {}", currency, sender)))?;

        let balance = Balance::new(available).map_err(DomainError::from)?;
        if !balance.is_sufficient_for(&amount) {
            return Err(ExchangeError::InsufficientFunds {
                required: amount.value(),
                available,
            });
        }

        let remaining = balance.debit(&amount).map_err(DomainError::from)?;
        tx.write_balance(sender, currency, remaining.value()).await?;
        tx.increment_balance(receiver, currency, amount.value()).await?;

        tracing::debug!(
            sender = %sender,
            receiver = %receiver,
            currency = %currency,
            amount = %amount,
            "Funds moved"
        );
        Ok(())
    }
}
