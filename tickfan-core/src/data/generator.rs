//! Synthetic tick generator
//!
//! Endless, seeded sequence of ticks. Ids start at 1 and increase by one per
//! generated tick; symbol, price and side are drawn independently.

use crate::config::SourceConfig;
use crate::core::{Side, Symbol, Tick, TickId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

/// Seeded, infinite tick sequence
#[derive(Debug, Clone)]
pub struct TickGenerator {
    rng: StdRng,
    symbols: Vec<Symbol>,
    price_min: f64,
    price_max: f64,
    buy_probability: f64,
    next_id: u64,
}

impl TickGenerator {
    pub fn new(config: &SourceConfig, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            symbols: config.symbols.iter().map(|s| Symbol::new(s)).collect(),
            price_min: config.price_min,
            price_max: config.price_max,
            buy_probability: config.buy_probability,
            next_id: 1,
        }
    }

    /// Id the next generated tick will carry
    #[inline(always)]
    pub fn peek_id(&self) -> TickId {
        TickId::new(self.next_id)
    }

    pub fn next_tick(&mut self) -> Tick {
        let id = TickId::new(self.next_id);
        self.next_id += 1;

        let symbol = self.symbols[self.rng.gen_range(0..self.symbols.len())].clone();
        let price = self.rng.gen_range(self.price_min..self.price_max);
        let side = if self.rng.gen_bool(self.buy_probability) {
            Side::Buy
        } else {
            Side::Sell
        };

        Tick::new(id, symbol, price, side, Instant::now())
    }
}

impl Iterator for TickGenerator {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        Some(self.next_tick())
    }
}
