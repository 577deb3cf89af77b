//! Token Cache
//!
//! Session-token expiry per user and the execution price history per
//! currency, stored as plain strings in a [`KeyValueCache`].

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::{CurrencyCode, Price, UserId};

use super::{CacheError, CacheResult, KeyValueCache};

const TOKEN_SUFFIX: &str = "_token";
const OPERATIONS_SUFFIX: &str = "_operations";

fn token_key(user: UserId) -> String {
    format!("{}{}", user, TOKEN_SUFFIX)
}

fn operations_key(currency: &CurrencyCode) -> String {
    format!("{}{}", currency, OPERATIONS_SUFFIX)
}

/// Typed view over a shared cache backend.
#[derive(Clone)]
pub struct TokenCache {
    cache: Arc<dyn KeyValueCache>,
}

impl TokenCache {
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self { cache }
    }

    /// Read the user's stored token expiry and, when `expires_at` is given,
    /// replace it.
    ///
    /// Returns the expiry stored before the call. With no new expiry a
    /// missing entry is [`CacheError::NotFound`]; with one it is `Ok(None)`.
    pub async fn get_or_update(
        &self,
        user: UserId,
        expires_at: Option<DateTime<Utc>>,
    ) -> CacheResult<Option<DateTime<Utc>>> {
        let key = token_key(user);
        let current = self.cache.get(&key).await?;

        if current.is_none() && expires_at.is_none() {
            return Err(CacheError::NotFound(key));
        }

        if let Some(expires_at) = expires_at {
            let value = expires_at.to_rfc3339_opts(SecondsFormat::Secs, true);
            self.cache.set(&key, &value).await?;
        }

        current
            .map(|value| {
                DateTime::parse_from_rfc3339(&value)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| CacheError::Malformed {
                        key: key.clone(),
                        reason: e.to_string(),
                    })
            })
            .transpose()
    }

    /// Forget the user's token expiry.
    pub async fn revoke(&self, user: UserId) -> CacheResult<bool> {
        let removed = self.cache.remove(&[&token_key(user)]).await?;
        Ok(removed > 0)
    }

    /// Append an executed price to the currency's operation history.
    pub async fn record_operation(&self, currency: &CurrencyCode, price: Price) -> CacheResult<()> {
        self.cache
            .push_list(&operations_key(currency), &price.to_string())
            .await
    }

    /// Executed prices for `currency`, most recent first.
    pub async fn operations(&self, currency: &CurrencyCode) -> CacheResult<Vec<Price>> {
        let key = operations_key(currency);
        self.cache
            .list(&key)
            .await?
            .iter()
            .map(|value| {
                value
                    .parse::<Decimal>()
                    .ok()
                    .and_then(|d| Price::new(d).ok())
                    .ok_or_else(|| CacheError::Malformed {
                        key: key.clone(),
                        reason: format!("not a price: {}", value),
                    })
            })
            .collect()
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}
