//! Store module
//!
//! Transaction coordination and the repository traits the exchange core is
//! written against. Two backends implement them: [`PgStore`] over PostgreSQL
//! and [`MemoryStore`], an in-process fake with the same isolation contract.
//!
//! A store hands out transaction handles. A handle walks
//! `Idle -> Active -> (Committed | RolledBack)`; every read and write must
//! happen while it is `Active`, and writes become visible to other handles
//! only on commit.

mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{CurrencyCode, Price, PriceBand, SellOffer, UserId};

pub use error::StoreError;
pub use memory::{MemorySnapshot, MemoryStore, MemoryTransaction, TransactionStats};
pub use postgres::{PgStore, PgTransaction};

/// Store-layer Result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Lifecycle of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Active,
    Committed,
    RolledBack,
}

/// Outcome of a commit or rollback call.
///
/// `AlreadyFinalized` is the benign no-op returned when no unit of work was
/// active; it is never surfaced as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalize {
    Committed,
    RolledBack,
    AlreadyFinalized,
}

/// Unit-of-work demarcation plus the selling pool lock.
#[async_trait]
pub trait TransactionControl: Send {
    fn state(&self) -> TxState;

    fn is_active(&self) -> bool {
        self.state() == TxState::Active
    }

    /// Start a unit of work. A no-op while one is already active, so nested
    /// call sites can each ensure a transaction. After commit or rollback a
    /// new unit of work is started.
    async fn begin(&mut self) -> StoreResult<()>;

    /// Commit the active unit of work; `AlreadyFinalized` if there is none.
    async fn commit(&mut self) -> StoreResult<Finalize>;

    /// Roll back the active unit of work; `AlreadyFinalized` if there is none.
    async fn rollback(&mut self) -> StoreResult<Finalize>;

    /// Begin if needed, then take the exclusive lock over the whole selling
    /// pool. Released only by commit or rollback.
    ///
    /// Must come before any pool read in the same unit of work. The
    /// in-memory store refuses with [`StoreError::PoolLockAfterRead`]
    /// rather than upgrade a shared lock.
    async fn lock_selling_pool(&mut self) -> StoreResult<()>;
}

/// Per-user, per-currency spendable balances.
#[async_trait]
pub trait BalanceStore: TransactionControl {
    /// Current balance, `None` when the row does not exist.
    async fn balance(&mut self, user: UserId, currency: &CurrencyCode) -> StoreResult<Option<Decimal>>;

    /// Like [`balance`](Self::balance), but locks the row until the unit of
    /// work ends so no concurrent writer can change it in between.
    async fn balance_for_update(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
    ) -> StoreResult<Option<Decimal>>;

    /// Overwrite the balance row, creating it if missing.
    async fn write_balance(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
        amount: Decimal,
    ) -> StoreResult<()>;

    /// Add `delta` to the balance row, inserting it with `delta` when missing.
    /// Returns the new amount.
    async fn increment_balance(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
        delta: Decimal,
    ) -> StoreResult<Decimal>;
}

/// Standing sell offers.
#[async_trait]
pub trait SellingPoolStore: TransactionControl {
    /// Offers of `currency` priced inside `band` with a non-zero residual,
    /// cheapest first; equal prices keep storage order.
    async fn offers_in_band(
        &mut self,
        currency: &CurrencyCode,
        band: &PriceBand,
    ) -> StoreResult<Vec<SellOffer>>;

    /// One seller's offers of `currency` inside `band`, cheapest first,
    /// including exhausted ones.
    async fn seller_offers_in_band(
        &mut self,
        seller: UserId,
        currency: &CurrencyCode,
        band: &PriceBand,
    ) -> StoreResult<Vec<SellOffer>>;

    /// Add `delta` to the offer at (seller, currency, price), inserting it
    /// when missing. Returns the new residual.
    async fn increment_offer(
        &mut self,
        seller: UserId,
        currency: &CurrencyCode,
        price: Price,
        delta: Decimal,
    ) -> StoreResult<Decimal>;
}

/// Everything a settlement needs from one transaction handle.
pub trait ExchangeTransaction: BalanceStore + SellingPoolStore {}

impl<T: BalanceStore + SellingPoolStore> ExchangeTransaction for T {}

/// Roll back after a failed step. The caller keeps the original error; a
/// rollback failure on top of it is only logged.
pub async fn rollback_quietly<T: TransactionControl + ?Sized>(tx: &mut T) {
    match tx.rollback().await {
        Ok(Finalize::RolledBack) => tracing::debug!("Unit of work rolled back"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "Rollback failed"),
    }
}

/// Source of transaction handles.
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: ExchangeTransaction + 'static;

    /// A fresh handle in the `Idle` state.
    async fn transaction(&self) -> StoreResult<Self::Tx>;
}
