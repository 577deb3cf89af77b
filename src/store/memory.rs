//! In-memory Store
//!
//! Process-local implementation of the store traits, used by tests and the
//! load test binary in place of PostgreSQL. It keeps the same contract:
//!
//! - reads see committed data plus the handle's own uncommitted writes
//!   (read committed);
//! - `balance_for_update` and every write take a row lock held until the unit
//!   of work ends;
//! - selling pool access takes the pool lock in shared mode, and
//!   `lock_selling_pool` takes it exclusively and must come before any pool
//!   read on the same handle;
//! - a lock wait longer than the configured timeout fails with
//!   [`StoreError::LockTimeout`], which stands in for deadlock detection;
//! - non-negative amounts are checked when committing.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio::time::timeout;

use crate::domain::{CurrencyCode, OfferKey, Price, PriceBand, SellOffer, UserId};

use super::{
    BalanceStore, Finalize, SellingPoolStore, Store, StoreError, StoreResult, TransactionControl,
    TxState,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type BalanceKey = (UserId, CurrencyCode);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Balance(BalanceKey),
    Offer(OfferKey),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Balance((user, currency)) => write!(f, "balances({}, {})", user, currency),
            RowKey::Offer(key) => {
                write!(f, "selling({}, {}, {})", key.seller, key.currency, key.price)
            }
        }
    }
}

/// Committed contents of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySnapshot {
    pub balances: HashMap<BalanceKey, Decimal>,
    /// Offers in storage (insertion) order
    pub offers: Vec<SellOffer>,
}

impl MemorySnapshot {
    pub fn balance(&self, user: UserId, currency: &CurrencyCode) -> Option<Decimal> {
        self.balances.get(&(user, currency.clone())).copied()
    }

    pub fn offer(&self, seller: UserId, currency: &CurrencyCode, price: Price) -> Option<Decimal> {
        self.offers
            .iter()
            .find(|o| o.seller == seller && &o.currency == currency && o.price == price)
            .map(|o| o.amount)
    }

    /// Everything held in `currency`: spendable balances plus escrowed offers.
    pub fn currency_total(&self, currency: &CurrencyCode) -> Decimal {
        let spendable: Decimal = self
            .balances
            .iter()
            .filter(|((_, c), _)| c == currency)
            .map(|(_, amount)| *amount)
            .sum();
        let escrowed: Decimal = self
            .offers
            .iter()
            .filter(|o| &o.currency == currency)
            .map(|o| o.amount)
            .sum();
        spendable + escrowed
    }
}

/// Number of units of work actually started and finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

#[derive(Debug, Default)]
struct Counters {
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<MemorySnapshot>,
    row_locks: Mutex<HashMap<RowKey, Arc<Mutex<()>>>>,
    pool_lock: Arc<RwLock<()>>,
    lock_timeout: Duration,
    counters: Counters,
}

/// In-memory store. Clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(MemorySnapshot::default()),
                row_locks: Mutex::new(HashMap::new()),
                pool_lock: Arc::new(RwLock::new(())),
                lock_timeout,
                counters: Counters::default(),
            }),
        }
    }

    /// Write a committed balance directly, bypassing transactions.
    /// Fixture helper for tests and benchmarks.
    pub async fn seed_balance(&self, user: UserId, currency: &CurrencyCode, amount: Decimal) {
        let mut tables = self.shared.tables.write().await;
        tables.balances.insert((user, currency.clone()), amount);
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemorySnapshot {
        self.shared.tables.read().await.clone()
    }

    pub fn stats(&self) -> TransactionStats {
        let counters = &self.shared.counters;
        TransactionStats {
            begins: counters.begins.load(Ordering::SeqCst),
            commits: counters.commits.load(Ordering::SeqCst),
            rollbacks: counters.rollbacks.load(Ordering::SeqCst),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTransaction;

    async fn transaction(&self) -> StoreResult<MemoryTransaction> {
        Ok(MemoryTransaction::new(self.shared.clone()))
    }
}

enum PoolGuard {
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Transaction handle over a [`MemoryStore`].
///
/// Dropping an active handle discards its writes and releases its locks,
/// like a dropped database transaction.
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    state: TxState,
    balance_writes: HashMap<BalanceKey, Decimal>,
    /// Uncommitted offer rows in write order
    offer_writes: Vec<SellOffer>,
    row_guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    pool_guard: Option<PoolGuard>,
}

impl MemoryTransaction {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            state: TxState::Idle,
            balance_writes: HashMap::new(),
            offer_writes: Vec::new(),
            row_guards: HashMap::new(),
            pool_guard: None,
        }
    }

    fn ensure_active(&self) -> StoreResult<()> {
        if self.state == TxState::Active {
            Ok(())
        } else {
            Err(StoreError::NoActiveTransaction)
        }
    }

    /// End the unit of work: drop pending writes and release every lock.
    fn finish(&mut self, state: TxState) {
        self.state = state;
        self.balance_writes.clear();
        self.offer_writes.clear();
        self.row_guards.clear();
        self.pool_guard = None;
    }

    async fn lock_row(&mut self, key: RowKey) -> StoreResult<()> {
        if self.row_guards.contains_key(&key) {
            return Ok(());
        }

        let mutex = {
            let mut locks = self.shared.row_locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        let guard = timeout(self.shared.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(key.to_string()))?;

        self.row_guards.insert(key, guard);
        Ok(())
    }

    async fn share_pool(&mut self) -> StoreResult<()> {
        if self.pool_guard.is_some() {
            return Ok(());
        }

        let guard = timeout(self.shared.lock_timeout, self.shared.pool_lock.clone().read_owned())
            .await
            .map_err(|_| StoreError::LockTimeout("selling".to_string()))?;

        self.pool_guard = Some(PoolGuard::Shared(guard));
        Ok(())
    }

    /// Committed offers overlaid with this handle's writes.
    async fn visible_offers(&self) -> Vec<SellOffer> {
        let tables = self.shared.tables.read().await;
        let mut offers: Vec<SellOffer> = tables
            .offers
            .iter()
            .map(|committed| {
                self.pending_offer(&committed.key())
                    .unwrap_or(committed)
                    .clone()
            })
            .collect();

        for pending in &self.offer_writes {
            let key = pending.key();
            if !tables.offers.iter().any(|o| o.key() == key) {
                offers.push(pending.clone());
            }
        }
        offers
    }

    fn pending_offer(&self, key: &OfferKey) -> Option<&SellOffer> {
        self.offer_writes.iter().find(|o| &o.key() == key)
    }

    fn first_negative(&self) -> Option<String> {
        if let Some(((user, currency), amount)) = self.balance_writes.iter().find(|(_, a)| **a < Decimal::ZERO) {
            return Some(format!("balances({}, {}) = {}", user, currency, amount));
        }
        self.offer_writes
            .iter()
            .find(|o| o.amount < Decimal::ZERO)
            .map(|o| format!("selling({}, {}, {}) = {}", o.seller, o.currency, o.price, o.amount))
    }
}

#[async_trait]
impl TransactionControl for MemoryTransaction {
    fn state(&self) -> TxState {
        self.state
    }

    async fn begin(&mut self) -> StoreResult<()> {
        if self.state == TxState::Active {
            return Ok(());
        }

        self.finish(TxState::Active);
        self.shared.counters.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<Finalize> {
        if self.state != TxState::Active {
            return Ok(Finalize::AlreadyFinalized);
        }

        if let Some(row) = self.first_negative() {
            self.finish(TxState::RolledBack);
            self.shared.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::ConstraintViolation(format!("negative amount in {}", row)));
        }

        {
            let mut tables = self.shared.tables.write().await;
            for (key, amount) in self.balance_writes.drain() {
                tables.balances.insert(key, amount);
            }
            for pending in self.offer_writes.drain(..) {
                let key = pending.key();
                match tables.offers.iter_mut().find(|o| o.key() == key) {
                    Some(row) => row.amount = pending.amount,
                    None => tables.offers.push(pending),
                }
            }
        }

        // locks are released only after the writes are visible
        self.finish(TxState::Committed);
        self.shared.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(Finalize::Committed)
    }

    async fn rollback(&mut self) -> StoreResult<Finalize> {
        if self.state != TxState::Active {
            return Ok(Finalize::AlreadyFinalized);
        }

        self.finish(TxState::RolledBack);
        self.shared.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(Finalize::RolledBack)
    }

    async fn lock_selling_pool(&mut self) -> StoreResult<()> {
        self.begin().await?;
        if matches!(self.pool_guard, Some(PoolGuard::Exclusive(_))) {
            return Ok(());
        }

        // releasing a shared guard to upgrade would let earlier pool reads go stale
        if self.pool_guard.is_some() {
            return Err(StoreError::PoolLockAfterRead);
        }
        let guard = timeout(self.shared.lock_timeout, self.shared.pool_lock.clone().write_owned())
            .await
            .map_err(|_| StoreError::LockTimeout("selling".to_string()))?;

        self.pool_guard = Some(PoolGuard::Exclusive(guard));
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for MemoryTransaction {
    async fn balance(&mut self, user: UserId, currency: &CurrencyCode) -> StoreResult<Option<Decimal>> {
        self.ensure_active()?;
        let key = (user, currency.clone());
        if let Some(amount) = self.balance_writes.get(&key) {
            return Ok(Some(*amount));
        }
        Ok(self.shared.tables.read().await.balances.get(&key).copied())
    }

    async fn balance_for_update(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
    ) -> StoreResult<Option<Decimal>> {
        self.ensure_active()?;
        self.lock_row(RowKey::Balance((user, currency.clone()))).await?;
        self.balance(user, currency).await
    }

    async fn write_balance(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
        amount: Decimal,
    ) -> StoreResult<()> {
        self.ensure_active()?;
        let key = (user, currency.clone());
        self.lock_row(RowKey::Balance(key.clone())).await?;
        self.balance_writes.insert(key, amount);
        Ok(())
    }

    async fn increment_balance(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
        delta: Decimal,
    ) -> StoreResult<Decimal> {
        let current = self.balance_for_update(user, currency).await?.unwrap_or(Decimal::ZERO);
        let amount = current + delta;
        self.balance_writes.insert((user, currency.clone()), amount);
        Ok(amount)
    }
}

#[async_trait]
impl SellingPoolStore for MemoryTransaction {
    async fn offers_in_band(
        &mut self,
        currency: &CurrencyCode,
        band: &PriceBand,
    ) -> StoreResult<Vec<SellOffer>> {
        self.ensure_active()?;
        self.share_pool().await?;

        let mut offers: Vec<SellOffer> = self
            .visible_offers()
            .await
            .into_iter()
            .filter(|o| &o.currency == currency && band.contains(o.price) && o.amount > Decimal::ZERO)
            .collect();
        // stable: equal prices keep storage order
        offers.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(offers)
    }

    async fn seller_offers_in_band(
        &mut self,
        seller: UserId,
        currency: &CurrencyCode,
        band: &PriceBand,
    ) -> StoreResult<Vec<SellOffer>> {
        self.ensure_active()?;
        self.share_pool().await?;

        let mut offers: Vec<SellOffer> = self
            .visible_offers()
            .await
            .into_iter()
            .filter(|o| o.seller == seller && &o.currency == currency && band.contains(o.price))
            .collect();
        offers.sort_by(|a, b| a.price.cmp(&b.price));

        for offer in &offers {
            self.lock_row(RowKey::Offer(offer.key())).await?;
        }
        // re-read: a writer may have committed while we waited for a row
        let mut locked: Vec<SellOffer> = self
            .visible_offers()
            .await
            .into_iter()
            .filter(|o| o.seller == seller && &o.currency == currency && band.contains(o.price))
            .collect();
        locked.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(locked)
    }

    async fn increment_offer(
        &mut self,
        seller: UserId,
        currency: &CurrencyCode,
        price: Price,
        delta: Decimal,
    ) -> StoreResult<Decimal> {
        self.ensure_active()?;
        self.share_pool().await?;

        let key = OfferKey {
            seller,
            currency: currency.clone(),
            price,
        };
        self.lock_row(RowKey::Offer(key.clone())).await?;

        let current = self
            .visible_offers()
            .await
            .into_iter()
            .find(|o| o.key() == key)
            .map(|o| o.amount)
            .unwrap_or(Decimal::ZERO);
        let amount = current + delta;

        match self.offer_writes.iter_mut().find(|o| o.key() == key) {
            Some(pending) => pending.amount = amount,
            None => self.offer_writes.push(SellOffer {
                seller,
                currency: currency.clone(),
                price,
                amount,
            }),
        }
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    #[tokio::test]
    async fn test_operations_require_active_transaction() {
        let store = MemoryStore::new();
        let mut tx = store.transaction().await.unwrap();

        let result = tx.balance(UserId::new(1), &usd()).await;
        assert!(matches!(result, Err(StoreError::NoActiveTransaction)));
    }

    #[tokio::test]
    async fn test_writes_visible_only_after_commit() {
        let store = MemoryStore::new();
        let mut writer = store.transaction().await.unwrap();
        let mut reader = store.transaction().await.unwrap();

        writer.begin().await.unwrap();
        writer.increment_balance(UserId::new(1), &usd(), dec!(10)).await.unwrap();
        assert_eq!(writer.balance(UserId::new(1), &usd()).await.unwrap(), Some(dec!(10)));

        reader.begin().await.unwrap();
        assert_eq!(reader.balance(UserId::new(1), &usd()).await.unwrap(), None);

        writer.commit().await.unwrap();
        assert_eq!(reader.balance(UserId::new(1), &usd()).await.unwrap(), Some(dec!(10)));
        reader.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        store.seed_balance(UserId::new(1), &usd(), dec!(5)).await;

        let mut tx = store.transaction().await.unwrap();
        tx.begin().await.unwrap();
        tx.write_balance(UserId::new(1), &usd(), dec!(0)).await.unwrap();
        assert_eq!(tx.rollback().await.unwrap(), Finalize::RolledBack);

        assert_eq!(store.snapshot().await.balance(UserId::new(1), &usd()), Some(dec!(5)));
    }

    #[tokio::test]
    async fn test_negative_balance_rejected_at_commit() {
        let store = MemoryStore::new();
        let mut tx = store.transaction().await.unwrap();
        tx.begin().await.unwrap();

        // transiently negative inside the unit of work is allowed
        tx.increment_balance(UserId::new(1), &usd(), dec!(-3)).await.unwrap();
        let result = tx.commit().await;

        assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));
        assert_eq!(tx.state(), TxState::RolledBack);
        assert!(store.snapshot().await.balances.is_empty());
    }

    #[tokio::test]
    async fn test_offers_sorted_by_price_then_storage_order() {
        let store = MemoryStore::new();
        let mut tx = store.transaction().await.unwrap();
        tx.begin().await.unwrap();

        let price = |p| Price::new(p).unwrap();
        tx.increment_offer(UserId::new(1), &usd(), price(dec!(2)), dec!(1)).await.unwrap();
        tx.increment_offer(UserId::new(2), &usd(), price(dec!(1)), dec!(1)).await.unwrap();
        tx.increment_offer(UserId::new(3), &usd(), price(dec!(2)), dec!(1)).await.unwrap();
        tx.increment_offer(UserId::new(4), &usd(), price(dec!(3)), dec!(0)).await.unwrap();
        tx.commit().await.unwrap();

        tx.begin().await.unwrap();
        let band = PriceBand::new(dec!(0), dec!(10)).unwrap();
        let sellers: Vec<i64> = tx
            .offers_in_band(&usd(), &band)
            .await
            .unwrap()
            .iter()
            .map(|o| o.seller.get())
            .collect();
        assert_eq!(sellers, vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_row_lock_times_out() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(20));
        let mut first = store.transaction().await.unwrap();
        let mut second = store.transaction().await.unwrap();

        first.begin().await.unwrap();
        second.begin().await.unwrap();
        first.balance_for_update(UserId::new(1), &usd()).await.unwrap();

        let result = second.write_balance(UserId::new(1), &usd(), dec!(1)).await;
        assert!(matches!(result, Err(StoreError::LockTimeout(_))));
    }

    #[tokio::test]
    async fn test_exclusive_pool_lock_blocks_readers() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(20));
        let mut owner = store.transaction().await.unwrap();
        let mut reader = store.transaction().await.unwrap();

        owner.lock_selling_pool().await.unwrap();
        assert!(owner.is_active());

        reader.begin().await.unwrap();
        let band = PriceBand::new(dec!(0), dec!(1)).unwrap();
        let blocked = reader.offers_in_band(&usd(), &band).await;
        assert!(matches!(blocked, Err(StoreError::LockTimeout(_))));

        owner.commit().await.unwrap();
        assert!(reader.offers_in_band(&usd(), &band).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pool_lock_is_reentrant() {
        let store = MemoryStore::new();
        let mut tx = store.transaction().await.unwrap();

        tx.lock_selling_pool().await.unwrap();
        let band = PriceBand::new(dec!(0), dec!(1)).unwrap();
        tx.offers_in_band(&usd(), &band).await.unwrap();
        tx.lock_selling_pool().await.unwrap();
        assert_eq!(store.stats().begins, 1);
    }

    #[tokio::test]
    async fn test_pool_lock_after_pool_read_is_refused() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(20));
        let mut tx = store.transaction().await.unwrap();
        tx.begin().await.unwrap();

        let band = PriceBand::new(dec!(0), dec!(1)).unwrap();
        tx.offers_in_band(&usd(), &band).await.unwrap();
        let result = tx.lock_selling_pool().await;
        assert!(matches!(result, Err(StoreError::PoolLockAfterRead)));

        // the shared guard is still held, so another writer stays out
        let mut other = store.transaction().await.unwrap();
        let blocked = other.lock_selling_pool().await;
        assert!(matches!(blocked, Err(StoreError::LockTimeout(_))));

        tx.rollback().await.unwrap();
        other.lock_selling_pool().await.unwrap();
    }
}
