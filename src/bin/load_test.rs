//! Load Testing Tool
//!
//! Concurrent settlements against the in-memory store.
//!
//! Run with: cargo run --bin load_test --release -- --buyers 100 --sellers 20 --deadline-ms 10000

use std::sync::Arc;
use std::time::{Duration, Instant};

use currency_exchange::cache::{MemoryCache, TokenCache};
use currency_exchange::domain::{Amount, CurrencyCode, OperationContext, PriceBand, UserId};
use currency_exchange::handlers::{BuyCommand, OfferCommand, OfferHandler, SettlementHandler};
use currency_exchange::notify::BroadcastPublisher;
use currency_exchange::store::MemoryStore;
use currency_exchange::ExchangeError;
use rust_decimal::Decimal;

fn arg(args: &[String], name: &str, default: u64) -> u64 {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let buyers = arg(&args, "--buyers", 100) as i64;
    let sellers = arg(&args, "--sellers", 20) as i64;
    let lock_timeout = Duration::from_millis(arg(&args, "--lock-timeout-ms", 30_000));
    let deadline = Duration::from_millis(arg(&args, "--deadline-ms", 10_000));

    let currency = CurrencyCode::new("USD")?;
    let store = MemoryStore::with_lock_timeout(lock_timeout);
    let publisher = Arc::new(BroadcastPublisher::new(1024));
    let tokens = TokenCache::new(Arc::new(MemoryCache::new()));

    println!("Load Test - {} buyers against {} sellers", buyers, sellers);

    // every seller offers 100 units at a price between 1.00 and 1.19
    let offers = OfferHandler::new(store.clone(), publisher.clone());
    for seller in 1..=sellers {
        store.seed_balance(UserId::new(seller), &currency, Decimal::from(100)).await;
        let price = Decimal::new(100 + (seller % 20), 2);
        offers
            .place_offer(
                OfferCommand::new(UserId::new(seller), currency.clone(), "100".to_string(), price),
                &OperationContext::new(),
            )
            .await?;
    }

    let settlements = Arc::new(SettlementHandler::new(store.clone(), publisher, tokens));
    let band = PriceBand::new(Decimal::ONE, Decimal::new(2, 0))?;
    let amount = Amount::from_integer(7)?;

    let start = Instant::now();
    let mut tasks = Vec::with_capacity(buyers as usize);
    for buyer in 1..=buyers {
        let settlements = settlements.clone();
        let command = BuyCommand::new(UserId::new(1_000_000 + buyer), currency.clone(), amount, band);
        tasks.push(tokio::spawn(async move {
            settlements
                .settle_buy_with_deadline(command, &OperationContext::new(), deadline)
                .await
        }));
    }

    let mut settled = 0u64;
    let mut rejected = 0u64;
    let mut timed_out = 0u64;
    let mut contended = 0u64;
    let mut failed = 0u64;
    for task in tasks {
        match task.await? {
            Ok(_) => settled += 1,
            Err(e) if e.is_business_outcome() => rejected += 1,
            Err(ExchangeError::Timeout) => timed_out += 1,
            Err(ExchangeError::StoreFailure(e)) if e.is_contention() => contended += 1,
            Err(_) => failed += 1,
        }
    }

    let elapsed = start.elapsed();
    let rate = settled as f64 / elapsed.as_secs_f64();
    let stats = store.stats();
    let snapshot = store.snapshot().await;

    println!("\n=== Load Test Results ===");
    println!("Settled: {}", settled);
    println!("Rejected (liquidity): {}", rejected);
    println!("Timed out: {}", timed_out);
    println!("Lock contention: {}", contended);
    println!("Failed: {}", failed);
    println!("Transactions: {} begun, {} committed, {} rolled back", stats.begins, stats.commits, stats.rollbacks);
    println!("Total {} held: {}", currency, snapshot.currency_total(&currency));
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Rate: {:.0} settlements/sec", rate);

    Ok(())
}
