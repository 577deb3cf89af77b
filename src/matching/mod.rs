//! Matching module
//!
//! Cheapest-first selection of sell offers covering a buy request.

mod engine;

pub use engine::{select_fills, MatchingEngine};
