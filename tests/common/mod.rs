//! Common test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use currency_exchange::cache::{MemoryCache, TokenCache};
use currency_exchange::domain::{CurrencyCode, OperationContext, UserId};
use currency_exchange::handlers::{OfferCommand, OfferHandler, SettlementHandler};
use currency_exchange::notify::BroadcastPublisher;
use currency_exchange::store::{MemoryStore, PgStore};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub fn usd() -> CurrencyCode {
    CurrencyCode::new("USD").unwrap()
}

pub fn eur() -> CurrencyCode {
    CurrencyCode::new("EUR").unwrap()
}

/// Handlers wired to one in-memory store
pub struct TestExchange {
    pub store: MemoryStore,
    pub publisher: BroadcastPublisher,
    pub offers: OfferHandler<MemoryStore>,
    pub settlements: Arc<SettlementHandler<MemoryStore>>,
}

pub fn memory_exchange() -> TestExchange {
    let store = MemoryStore::new();
    let publisher = BroadcastPublisher::new(256);
    let tokens = TokenCache::new(Arc::new(MemoryCache::new()));

    TestExchange {
        offers: OfferHandler::new(store.clone(), Arc::new(publisher.clone())),
        settlements: Arc::new(SettlementHandler::new(
            store.clone(),
            Arc::new(publisher.clone()),
            tokens,
        )),
        store,
        publisher,
    }
}

impl TestExchange {
    /// Fund the seller and escrow everything into one offer.
    pub async fn seed_offer(&self, seller: i64, amount: Decimal, price: Decimal) {
        let seller = UserId::new(seller);
        let current = self.store.snapshot().await.balance(seller, &usd()).unwrap_or(Decimal::ZERO);
        self.store.seed_balance(seller, &usd(), current + amount).await;
        self.offers
            .place_offer(
                OfferCommand::new(seller, usd(), amount.to_string(), price),
                &OperationContext::new(),
            )
            .await
            .expect("Failed to place offer");
    }
}

static DATABASE: Mutex<()> = Mutex::new(());

/// Database tests share tables, so they run one at a time.
pub fn serial() -> MutexGuard<'static, ()> {
    DATABASE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Setup test database - truncate tables and seed users and currencies
pub async fn setup_test_db() -> PgStore {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let mut tx = pool.begin().await.expect("Failed to begin transaction");

    sqlx::query("TRUNCATE TABLE selling, balances, currencies, users RESTART IDENTITY CASCADE")
        .execute(&mut *tx)
        .await
        .expect("Failed to clean up DB");

    for (code, value) in [("USD", "1"), ("EUR", "1.1")] {
        sqlx::query("INSERT INTO currencies (code, value) VALUES ($1, $2::numeric)")
            .bind(code)
            .bind(value)
            .execute(&mut *tx)
            .await
            .expect("Failed to seed currency");
    }

    for id in 1..=4_i64 {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, credential_hash, credential_salt)
            VALUES ($1, $2, 'x', 'x')
            "#,
        )
        .bind(id)
        .bind(format!("user{}@example.test", id))
        .execute(&mut *tx)
        .await
        .expect("Failed to seed user");
    }

    sqlx::query("SELECT setval('users_id_seq', 4)")
        .execute(&mut *tx)
        .await
        .expect("Failed to reset user sequence");

    tx.commit().await.expect("Failed to commit seed data");

    PgStore::new(pool)
}

pub async fn seed_pg_balance(pool: &PgPool, user: i64, currency: &str, amount: Decimal) {
    sqlx::query(
        r#"
        INSERT INTO balances (user_id, currency, amount)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, currency) DO UPDATE SET amount = EXCLUDED.amount
        "#,
    )
    .bind(user)
    .bind(currency)
    .bind(amount)
    .execute(pool)
    .await
    .expect("Failed to seed balance");
}

pub async fn pg_balance(pool: &PgPool, user: i64, currency: &str) -> Option<Decimal> {
    sqlx::query_scalar("SELECT amount FROM balances WHERE user_id = $1 AND currency = $2")
        .bind(user)
        .bind(currency)
        .fetch_optional(pool)
        .await
        .expect("Failed to read balance")
}
