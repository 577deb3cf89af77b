//! Matching Engine
//!
//! Walks the offers of a price band cheapest first and takes from each
//! until the requested amount is covered. Read-only: the caller's
//! transaction decides what happens to the result.

use rust_decimal::Decimal;

use crate::domain::{Amount, CurrencyCode, DomainError, Fill, MatchResult, PriceBand, SellOffer, UserId};
use crate::error::{ExchangeError, ExchangeResult};
use crate::store::SellingPoolStore;

/// Stateless matcher over a [`SellingPoolStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingEngine;

impl MatchingEngine {
    pub fn new() -> Self {
        Self
    }

    /// Sellers covering `amount` of `currency` inside `band`.
    ///
    /// Fails with [`ExchangeError::InsufficientLiquidity`] when the band
    /// cannot cover the request; no partial result is returned.
    pub async fn find_sellers<T>(
        &self,
        tx: &mut T,
        currency: &CurrencyCode,
        amount: Amount,
        band: &PriceBand,
    ) -> ExchangeResult<MatchResult>
    where
        T: SellingPoolStore + ?Sized,
    {
        let offers = tx.offers_in_band(currency, band).await?;
        let matched = select_fills(offers, amount)?;

        tracing::debug!(
            currency = %currency,
            band = %band,
            amount = %amount,
            fills = matched.len(),
            "Matched sellers"
        );
        Ok(matched)
    }

    /// Like [`find_sellers`](Self::find_sellers), skipping offers placed by
    /// `buyer` so nobody is matched against their own liquidity.
    pub async fn find_sellers_excluding<T>(
        &self,
        tx: &mut T,
        currency: &CurrencyCode,
        amount: Amount,
        band: &PriceBand,
        buyer: UserId,
    ) -> ExchangeResult<MatchResult>
    where
        T: SellingPoolStore + ?Sized,
    {
        let offers = tx
            .offers_in_band(currency, band)
            .await?
            .into_iter()
            .filter(|offer| offer.seller != buyer);
        let matched = select_fills(offers, amount)?;

        tracing::debug!(
            currency = %currency,
            band = %band,
            amount = %amount,
            buyer = %buyer,
            fills = matched.len(),
            "Matched sellers"
        );
        Ok(matched)
    }
}

/// Greedy selection over offers already sorted cheapest first.
///
/// Every offer is taken whole until the running sum would reach `target`;
/// the last one is taken only for the remainder.
pub fn select_fills<I>(offers: I, target: Amount) -> ExchangeResult<MatchResult>
where
    I: IntoIterator<Item = SellOffer>,
{
    let mut fills = Vec::new();
    let mut covered = Decimal::ZERO;

    for offer in offers {
        if offer.amount <= Decimal::ZERO {
            continue;
        }

        let take = offer.amount.min(target.value() - covered);
        fills.push(Fill {
            seller: offer.seller,
            amount: Amount::new(take).map_err(DomainError::from)?,
            price: offer.price,
        });
        covered += take;

        if covered == target.value() {
            return Ok(MatchResult::new(fills));
        }
    }

    Err(ExchangeError::InsufficientLiquidity {
        requested: target.value(),
        available: covered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Price;
    use crate::store::{MemoryStore, Store, TransactionControl};
    use rust_decimal_macros::dec;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    fn offer(seller: i64, amount: Decimal, price: Decimal) -> SellOffer {
        SellOffer {
            seller: UserId::new(seller),
            currency: usd(),
            price: Price::new(price).unwrap(),
            amount,
        }
    }

    #[test]
    fn test_select_takes_remainder_from_last_offer() {
        let offers = vec![offer(1, dec!(10), dec!(1)), offer(2, dec!(15), dec!(2))];
        let matched = select_fills(offers, Amount::new(dec!(20)).unwrap()).unwrap();

        let fills: Vec<(i64, Decimal, Decimal)> = matched
            .fills()
            .iter()
            .map(|f| (f.seller.get(), f.amount.value(), f.price.value()))
            .collect();
        assert_eq!(fills, vec![(1, dec!(10), dec!(1)), (2, dec!(10), dec!(2))]);
        assert_eq!(matched.total(), dec!(20));
    }

    #[test]
    fn test_select_exact_cover_stops() {
        let offers = vec![
            offer(1, dec!(5), dec!(1)),
            offer(2, dec!(5), dec!(1)),
            offer(3, dec!(5), dec!(1)),
        ];
        let matched = select_fills(offers, Amount::new(dec!(10)).unwrap()).unwrap();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_select_insufficient_liquidity() {
        let offers = vec![offer(1, dec!(10), dec!(1)), offer(2, dec!(10), dec!(2))];
        let result = select_fills(offers, Amount::new(dec!(25)).unwrap());

        match result {
            Err(ExchangeError::InsufficientLiquidity { requested, available }) => {
                assert_eq!(requested, dec!(25));
                assert_eq!(available, dec!(20));
            }
            other => panic!("Expected InsufficientLiquidity, got: {:?}", other),
        }
    }

    #[test]
    fn test_select_empty_pool_is_insufficient_liquidity() {
        let result = select_fills(Vec::new(), Amount::new(dec!(1)).unwrap());
        assert!(matches!(
            result,
            Err(ExchangeError::InsufficientLiquidity { available, .. }) if available == Decimal::ZERO
        ));
    }

    #[test]
    fn test_select_skips_exhausted_offers() {
        let offers = vec![offer(1, dec!(0), dec!(1)), offer(2, dec!(3), dec!(2))];
        let matched = select_fills(offers, Amount::new(dec!(3)).unwrap()).unwrap();
        assert_eq!(matched.fills()[0].seller, UserId::new(2));
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        let mut tx = store.transaction().await.unwrap();
        tx.begin().await.unwrap();
        for (seller, amount, price) in [(1, dec!(10), dec!(1)), (2, dec!(15), dec!(2)), (3, dec!(50), dec!(20))] {
            tx.increment_offer(UserId::new(seller), &usd(), Price::new(price).unwrap(), amount)
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_find_sellers_respects_band() {
        let store = seeded_store().await;
        let mut tx = store.transaction().await.unwrap();
        tx.begin().await.unwrap();

        let engine = MatchingEngine::new();
        let band = PriceBand::new(dec!(0), dec!(10)).unwrap();
        let result = engine
            .find_sellers(&mut tx, &usd(), Amount::new(dec!(30)).unwrap(), &band)
            .await;

        // seller 3 is outside the band
        assert!(matches!(result, Err(ExchangeError::InsufficientLiquidity { .. })));
    }

    #[tokio::test]
    async fn test_find_sellers_excluding_buyer() {
        let store = seeded_store().await;
        let mut tx = store.transaction().await.unwrap();
        tx.begin().await.unwrap();

        let engine = MatchingEngine::new();
        let band = PriceBand::new(dec!(0), dec!(10)).unwrap();
        let matched = engine
            .find_sellers_excluding(&mut tx, &usd(), Amount::new(dec!(12)).unwrap(), &band, UserId::new(1))
            .await
            .unwrap();

        assert_eq!(matched.len(), 1);
        assert_eq!(matched.fills()[0].seller, UserId::new(2));
        assert_eq!(matched.total(), dec!(12));
    }
}
