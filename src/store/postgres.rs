//! PostgreSQL Store
//!
//! `balances` and `selling` tables accessed through one sqlx transaction per
//! handle. Statement-level read-committed isolation, row locks for
//! read-modify-write on balances, and `LOCK TABLE selling` for the pool lock.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{CurrencyCode, Price, PriceBand, SellOffer, UserId};

use super::{
    BalanceStore, Finalize, SellingPoolStore, Store, StoreError, StoreResult, TransactionControl,
    TxState,
};

/// Hands out [`PgTransaction`]s over a shared pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTransaction;

    async fn transaction(&self) -> StoreResult<PgTransaction> {
        Ok(PgTransaction::new(self.pool.clone()))
    }
}

/// Transaction handle. A pool connection is checked out on `begin` and
/// returned when the unit of work is committed or rolled back.
pub struct PgTransaction {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    state: TxState,
}

impl PgTransaction {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: None,
            state: TxState::Idle,
        }
    }

    fn active(&mut self) -> StoreResult<&mut Transaction<'static, Postgres>> {
        self.tx.as_mut().ok_or(StoreError::NoActiveTransaction)
    }
}

type OfferRow = (i64, String, Decimal, Decimal);

fn offer_from_row((seller, currency, price, amount): OfferRow) -> StoreResult<SellOffer> {
    let currency = CurrencyCode::new(&currency)
        .map_err(|e| StoreError::CorruptRow(format!("selling.currency: {}", e)))?;
    let price = Price::new(price).map_err(|e| StoreError::CorruptRow(format!("selling.price: {}", e)))?;
    Ok(SellOffer {
        seller: UserId::new(seller),
        currency,
        price,
        amount,
    })
}

#[async_trait]
impl TransactionControl for PgTransaction {
    fn state(&self) -> TxState {
        self.state
    }

    async fn begin(&mut self) -> StoreResult<()> {
        if self.tx.is_some() {
            return Ok(());
        }

        let tx = self.pool.begin().await?;
        self.tx = Some(tx);
        self.state = TxState::Active;
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<Finalize> {
        let Some(tx) = self.tx.take() else {
            tracing::debug!("commit with no active transaction");
            return Ok(Finalize::AlreadyFinalized);
        };

        self.state = TxState::Committed;
        tx.commit().await?;
        Ok(Finalize::Committed)
    }

    async fn rollback(&mut self) -> StoreResult<Finalize> {
        let Some(tx) = self.tx.take() else {
            tracing::debug!("rollback with no active transaction");
            return Ok(Finalize::AlreadyFinalized);
        };

        self.state = TxState::RolledBack;
        tx.rollback().await?;
        Ok(Finalize::RolledBack)
    }

    async fn lock_selling_pool(&mut self) -> StoreResult<()> {
        self.begin().await?;
        let tx = self.active()?;
        sqlx::query("LOCK TABLE selling IN ACCESS EXCLUSIVE MODE")
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for PgTransaction {
    async fn balance(&mut self, user: UserId, currency: &CurrencyCode) -> StoreResult<Option<Decimal>> {
        let tx = self.active()?;
        let amount: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT amount FROM balances
            WHERE user_id = $1 AND currency = $2
            "#,
        )
        .bind(user.get())
        .bind(currency.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        Ok(amount)
    }

    async fn balance_for_update(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
    ) -> StoreResult<Option<Decimal>> {
        let tx = self.active()?;
        let amount: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT amount FROM balances
            WHERE user_id = $1 AND currency = $2
            FOR UPDATE
            "#,
        )
        .bind(user.get())
        .bind(currency.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        Ok(amount)
    }

    async fn write_balance(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
        amount: Decimal,
    ) -> StoreResult<()> {
        let tx = self.active()?;
        sqlx::query(
            r#"
            INSERT INTO balances (user_id, currency, amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, currency)
            DO UPDATE SET amount = EXCLUDED.amount, updated_at = NOW()
            "#,
        )
        .bind(user.get())
        .bind(currency.as_str())
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn increment_balance(
        &mut self,
        user: UserId,
        currency: &CurrencyCode,
        delta: Decimal,
    ) -> StoreResult<Decimal> {
        let tx = self.active()?;
        // CHECK constraints apply to the proposed INSERT row even when it
        // conflicts, so a debit must go through UPDATE
        let updated: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE balances SET amount = amount + $3, updated_at = NOW()
            WHERE user_id = $1 AND currency = $2
            RETURNING amount
            "#,
        )
        .bind(user.get())
        .bind(currency.as_str())
        .bind(delta)
        .fetch_optional(&mut **tx)
        .await?;
        if let Some(amount) = updated {
            return Ok(amount);
        }

        let amount: Decimal = sqlx::query_scalar(
            r#"
            INSERT INTO balances (user_id, currency, amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, currency)
            DO UPDATE SET amount = balances.amount + EXCLUDED.amount, updated_at = NOW()
            RETURNING amount
            "#,
        )
        .bind(user.get())
        .bind(currency.as_str())
        .bind(delta)
        .fetch_one(&mut **tx)
        .await?;

        Ok(amount)
    }
}

#[async_trait]
impl SellingPoolStore for PgTransaction {
    async fn offers_in_band(
        &mut self,
        currency: &CurrencyCode,
        band: &PriceBand,
    ) -> StoreResult<Vec<SellOffer>> {
        let tx = self.active()?;
        let rows: Vec<OfferRow> = sqlx::query_as(
            r#"
            SELECT user_id, currency, price, amount
            FROM selling
            WHERE currency = $1 AND price BETWEEN $2 AND $3 AND amount > 0
            ORDER BY price ASC, id ASC
            "#,
        )
        .bind(currency.as_str())
        .bind(band.floor())
        .bind(band.ceiling())
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(offer_from_row).collect()
    }

    async fn seller_offers_in_band(
        &mut self,
        seller: UserId,
        currency: &CurrencyCode,
        band: &PriceBand,
    ) -> StoreResult<Vec<SellOffer>> {
        let tx = self.active()?;
        let rows: Vec<OfferRow> = sqlx::query_as(
            r#"
            SELECT user_id, currency, price, amount
            FROM selling
            WHERE user_id = $1 AND currency = $2 AND price BETWEEN $3 AND $4
            ORDER BY price ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(seller.get())
        .bind(currency.as_str())
        .bind(band.floor())
        .bind(band.ceiling())
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(offer_from_row).collect()
    }

    async fn increment_offer(
        &mut self,
        seller: UserId,
        currency: &CurrencyCode,
        price: Price,
        delta: Decimal,
    ) -> StoreResult<Decimal> {
        let tx = self.active()?;
        let updated: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE selling SET amount = amount + $4, updated_at = NOW()
            WHERE user_id = $1 AND currency = $2 AND price = $3
            RETURNING amount
            "#,
        )
        .bind(seller.get())
        .bind(currency.as_str())
        .bind(price.value())
        .bind(delta)
        .fetch_optional(&mut **tx)
        .await?;
        if let Some(amount) = updated {
            return Ok(amount);
        }

        let amount: Decimal = sqlx::query_scalar(
            r#"
            INSERT INTO selling (user_id, currency, price, amount)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, currency, price)
            DO UPDATE SET amount = selling.amount + EXCLUDED.amount, updated_at = NOW()
            RETURNING amount
            "#,
        )
        .bind(seller.get())
        .bind(currency.as_str())
        .bind(price.value())
        .bind(delta)
        .fetch_one(&mut **tx)
        .await?;

        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_offer_from_row() {
        let offer = offer_from_row((4, "usd".to_string(), dec!(1.50), dec!(10))).unwrap();
        assert_eq!(offer.seller, UserId::new(4));
        assert_eq!(offer.currency.as_str(), "USD");
        assert_eq!(offer.price.value(), dec!(1.5));
    }

    #[test]
    fn test_offer_from_corrupt_row() {
        let result = offer_from_row((4, "USD".to_string(), dec!(0), dec!(10)));
        assert!(matches!(result, Err(StoreError::CorruptRow(_))));
    }
}
