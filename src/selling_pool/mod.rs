//! Selling Pool module
//!
//! Escrowing liquidity into sell offers and consuming it again.

mod manager;

pub use manager::SellingPoolManager;
