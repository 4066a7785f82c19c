//! Test data generation for benchmarks.
//!
//! Generators are seeded so every run sees the same rows.

use ormcache_core::TypedAttribute;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Scale factor for benchmark data generation.
#[derive(Clone, Copy, Debug, Default)]
pub enum Scale {
    /// 100 trades. Use for quick iteration.
    Tiny,
    /// 1,000 trades
    Small,
    /// 10,000 trades
    #[default]
    Medium,
    /// 25,000 trades, still under the sub-query registration limit
    Large,
}

impl Scale {
    /// Number of trades for this scale.
    pub fn count(&self) -> usize {
        match self {
            Scale::Tiny => 100,
            Scale::Small => 1_000,
            Scale::Medium => 10_000,
            Scale::Large => 25_000,
        }
    }
}

pub const STATES: [&str; 4] = ["new", "filled", "partial", "cancelled"];

/// Trade entity used by every benchmark.
#[derive(Debug, Clone)]
pub struct Trade {
    pub id: i64,
    pub account: i32,
    pub symbol: String,
    pub quantity: i32,
    pub price: Option<f64>,
    pub state: String,
    pub memo: Option<String>,
}

/// Attributes over [`Trade`].
pub struct TradeAttributes {
    pub id: TypedAttribute<Trade, i64>,
    pub account: TypedAttribute<Trade, i32>,
    pub symbol: TypedAttribute<Trade, String>,
    pub quantity: TypedAttribute<Trade, i32>,
    pub price: TypedAttribute<Trade, f64>,
    pub state: TypedAttribute<Trade, String>,
    pub memo: TypedAttribute<Trade, String>,
}

impl TradeAttributes {
    pub fn new() -> Self {
        Self {
            id: TypedAttribute::new("Trade", "id", |t: &Trade| Some(t.id)),
            account: TypedAttribute::new("Trade", "account", |t: &Trade| Some(t.account)),
            symbol: TypedAttribute::new("Trade", "symbol", |t: &Trade| Some(t.symbol.clone())),
            quantity: TypedAttribute::new("Trade", "quantity", |t: &Trade| Some(t.quantity)),
            price: TypedAttribute::new("Trade", "price", |t: &Trade| t.price),
            state: TypedAttribute::new("Trade", "state", |t: &Trade| Some(t.state.clone())),
            memo: TypedAttribute::new("Trade", "memo", |t: &Trade| t.memo.clone()),
        }
    }
}

impl Default for TradeAttributes {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate `scale.count()` trades from a fixed seed.
pub fn generate_trades(scale: Scale, seed: u64) -> Vec<Trade> {
    let mut rng = StdRng::seed_from_u64(seed);
    let accounts = (scale.count() / 20).max(1) as i32;

    (0..scale.count())
        .map(|i| {
            let symbol: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(3)
                .map(|c| (c as char).to_ascii_uppercase())
                .collect();
            Trade {
                id: i as i64,
                account: rng.gen_range(0..accounts),
                symbol,
                quantity: rng.gen_range(1..1_000),
                price: (!rng.gen_bool(0.05)).then(|| rng.gen_range(1.0..500.0)),
                state: STATES[rng.gen_range(0..STATES.len())].to_string(),
                memo: rng
                    .gen_bool(0.3)
                    .then(|| format!("block order desk {}", rng.gen_range(0..10))),
            }
        })
        .collect()
}
