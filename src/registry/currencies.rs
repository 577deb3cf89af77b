//! Currency Registry
//!
//! Unit values are written by an external price feed and only read here,
//! apart from [`CurrencyRegistry::update`].

use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::domain::{CurrencyCode, DomainError, PriceBand};

use super::{RegistryError, RegistryResult};

/// A currency and its current unit value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyQuote {
    pub code: CurrencyCode,
    pub value: Decimal,
}

#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    pool: PgPool,
}

impl CurrencyRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All currencies ordered by code
    pub async fn list(&self) -> RegistryResult<Vec<CurrencyQuote>> {
        let rows: Vec<(String, Decimal)> =
            sqlx::query_as("SELECT code, value FROM currencies ORDER BY code")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(code, value)| -> RegistryResult<CurrencyQuote> {
                Ok(CurrencyQuote {
                    code: CurrencyCode::new(&code)?,
                    value,
                })
            })
            .collect()
    }

    pub async fn spot_value(&self, code: &CurrencyCode) -> RegistryResult<Option<Decimal>> {
        let value: Option<Decimal> = sqlx::query_scalar("SELECT value FROM currencies WHERE code = $1")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Price band of `spot ± spot * tolerance` around the currency's
    /// current value.
    pub async fn band_around_spot(
        &self,
        code: &CurrencyCode,
        tolerance: Decimal,
    ) -> RegistryResult<PriceBand> {
        let spot = self
            .spot_value(code)
            .await?
            .ok_or_else(|| RegistryError::UnknownCurrency(code.to_string()))?;
        Ok(PriceBand::around(spot, tolerance)?)
    }

    /// Set one currency's unit value.
    pub async fn update(&self, code: &CurrencyCode, value: Decimal) -> RegistryResult<()> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(value).into());
        }

        let result = sqlx::query(
            r#"
            UPDATE currencies
            SET value = $1, updated_at = NOW()
            WHERE code = $2
            "#,
        )
        .bind(value)
        .bind(code.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::UnknownCurrency(code.to_string()));
        }

        tracing::info!(currency = %code, value = %value, "Currency value updated");
        Ok(())
    }
}
