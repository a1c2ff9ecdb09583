use crate::instrument::{InstrumentCatalog, Sector};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::cmp::Reverse;

/// Strictly positive floor every simulated price is clamped to.
pub const MIN_PRICE: f64 = 0.01;

/// Max fraction above/below the base price the initial intraday high/low are drawn from.
const INITIAL_RANGE: f64 = 0.05;

const INITIAL_VOLUME_MIN: u64 = 100_000;
const INITIAL_VOLUME_MAX: u64 = 1_100_000;

/// Round to whole kobo (2 dp).
pub fn round_kobo(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Live price/volume record for one instrument.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Quote {
    pub symbol: SmolStr,
    pub name: SmolStr,
    pub sector: Sector,
    pub price: f64,
    /// `price - previous price`
    pub change: f64,
    /// `change / previous price * 100`
    pub change_percent: f64,
    pub volume: u64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub last_update: DateTime<Utc>,
}

/// The simulator-owned quote table. One [`Quote`] per catalog instrument, in catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteBook {
    quotes: IndexMap<SmolStr, Quote>,
}

impl QuoteBook {
    /// Seed one quote per instrument at its base price with a randomised intraday range and
    /// volume.
    pub fn new<R>(catalog: &InstrumentCatalog, rng: &mut R, now: DateTime<Utc>) -> Self
    where
        R: Rng,
    {
        let quotes = catalog
            .iter()
            .map(|instrument| {
                let base = instrument.base_price.max(MIN_PRICE);
                let high = round_kobo(base * (1.0 + rng.random_range(0.0..INITIAL_RANGE)));
                let low = round_kobo(base * (1.0 - rng.random_range(0.0..INITIAL_RANGE)))
                    .clamp(MIN_PRICE, base);

                let quote = Quote {
                    symbol: instrument.symbol.clone(),
                    name: instrument.name.clone(),
                    sector: instrument.sector,
                    price: base,
                    change: 0.0,
                    change_percent: 0.0,
                    volume: rng.random_range(INITIAL_VOLUME_MIN..INITIAL_VOLUME_MAX),
                    high: high.max(base),
                    low,
                    open: base,
                    last_update: now,
                };
                (instrument.symbol.clone(), quote)
            })
            .collect();

        Self { quotes }
    }

    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    pub fn symbol_at(&self, index: usize) -> Option<&SmolStr> {
        self.quotes.get_index(index).map(|(symbol, _)| symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SmolStr> {
        self.quotes.keys()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Apply a multiplicative move drawn uniformly from `[-volatility, +volatility]`.
    ///
    /// Returns a copy of the updated quote, or `None` if `symbol` is not in the book.
    pub fn tick_price<R>(
        &mut self,
        symbol: &str,
        volatility: f64,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Option<Quote>
    where
        R: Rng,
    {
        let quote = self.quotes.get_mut(symbol)?;
        // A non-finite volatility leaves the price unchanged
        let volatility = if volatility.is_finite() {
            volatility.abs()
        } else {
            0.0
        };
        let movement = rng.random_range(-volatility..=volatility);

        let previous = quote.price;
        let price = round_kobo(previous * (1.0 + movement)).max(MIN_PRICE);

        quote.price = price;
        quote.change = price - previous;
        quote.change_percent = quote.change / previous * 100.0;
        quote.high = quote.high.max(price);
        quote.low = quote.low.min(price);
        quote.last_update = now;

        Some(quote.clone())
    }

    /// Apply an additive volume change drawn from `[-max_delta, max_delta)`, floored at
    /// `floor`. Returns the new volume, or `None` if `symbol` is not in the book.
    pub fn tick_volume<R>(
        &mut self,
        symbol: &str,
        max_delta: u64,
        floor: u64,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Option<u64>
    where
        R: Rng,
    {
        let quote = self.quotes.get_mut(symbol)?;
        let max_delta = i64::try_from(max_delta).unwrap_or(i64::MAX);
        let delta = if max_delta > 0 {
            rng.random_range(-max_delta..max_delta)
        } else {
            0
        };

        let volume = i64::try_from(quote.volume)
            .unwrap_or(i64::MAX)
            .saturating_add(delta)
            .max(i64::try_from(floor).unwrap_or(i64::MAX));

        quote.volume = u64::try_from(volume).unwrap_or(floor);
        quote.last_update = now;

        Some(quote.volume)
    }

    /// Every quote in catalog order.
    pub fn snapshot(&self) -> Vec<Quote> {
        self.quotes.values().cloned().collect()
    }

    /// Every quote, highest volume first. Ties keep catalog order.
    pub fn snapshot_by_volume(&self) -> Vec<Quote> {
        self.quotes
            .values()
            .sorted_by_key(|quote| Reverse(quote.volume))
            .cloned()
            .collect()
    }

    /// Symbols of the `k` highest-volume quotes, highest first.
    pub fn top_by_volume(&self, k: usize) -> Vec<SmolStr> {
        self.quotes
            .values()
            .sorted_by_key(|quote| Reverse(quote.volume))
            .take(k)
            .map(|quote| quote.symbol.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Instrument;
    use rand::{SeedableRng, rngs::StdRng};

    fn book(seed: u64) -> QuoteBook {
        QuoteBook::new(&InstrumentCatalog::ngx(), &mut StdRng::seed_from_u64(seed), Utc::now())
    }

    #[test]
    fn test_initial_quotes_respect_bounds() {
        for seed in 0..16 {
            let book = book(seed);
            assert_eq!(book.len(), InstrumentCatalog::ngx().len());

            for quote in book.snapshot() {
                assert!(quote.low <= quote.price, "{} low above price", quote.symbol);
                assert!(quote.price <= quote.high, "{} high below price", quote.symbol);
                assert!(quote.low >= MIN_PRICE);
                assert!((INITIAL_VOLUME_MIN..INITIAL_VOLUME_MAX).contains(&quote.volume));
                assert_eq!(quote.open, quote.price);
                assert_eq!(quote.change, 0.0);
            }
        }
    }

    #[test]
    fn test_mtnn_tick_stays_within_volatility_band() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..500 {
            let mut book = book(1);
            let before = book.get("MTNN").unwrap().clone();
            assert_eq!(before.price, 580.00);

            let after = book.tick_price("MTNN", 0.02, &mut rng, Utc::now()).unwrap();

            assert!(
                (568.4 - 1e-9..=591.6 + 1e-9).contains(&after.price),
                "price {} outside band",
                after.price
            );
            assert!(after.high >= before.high && after.high >= after.price);
            assert!(after.low <= before.low && after.low <= after.price);
        }
    }

    #[test]
    fn test_tick_change_percent_is_relative_to_previous_price() {
        let mut book = book(3);
        let mut rng = StdRng::seed_from_u64(9);
        let symbols: Vec<SmolStr> = book.symbols().cloned().collect();

        for _ in 0..20 {
            for symbol in &symbols {
                let previous = book.get(symbol).unwrap().price;
                let quote = book.tick_price(symbol, 0.02, &mut rng, Utc::now()).unwrap();

                let expected = (quote.price - previous) / previous * 100.0;
                assert!((quote.change_percent - expected).abs() < 1e-9);
                assert!((quote.change - (quote.price - previous)).abs() < 1e-12);
                assert!(quote.low <= quote.price && quote.price <= quote.high);
            }
        }
    }

    #[test]
    fn test_tick_price_clamps_to_floor() {
        let catalog = InstrumentCatalog::new([Instrument::new(
            "PENNY",
            "Penny Stock",
            Sector::Technology,
            0.01,
        )]);
        let mut rng = StdRng::seed_from_u64(5);
        let mut book = QuoteBook::new(&catalog, &mut rng, Utc::now());

        for _ in 0..50 {
            let quote = book.tick_price("PENNY", 0.9, &mut rng, Utc::now()).unwrap();
            assert!(quote.price >= MIN_PRICE);
        }
    }

    #[test]
    fn test_tick_price_with_non_finite_volatility() {
        struct TestCase {
            input: f64,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: NaN volatility
                input: f64::NAN,
                expected: 580.00,
            },
            TestCase {
                // TC1: infinite volatility
                input: f64::INFINITY,
                expected: 580.00,
            },
            TestCase {
                // TC2: negative infinite volatility
                input: f64::NEG_INFINITY,
                expected: 580.00,
            },
        ];

        let mut rng = StdRng::seed_from_u64(13);
        for (index, test) in tests.into_iter().enumerate() {
            let mut book = book(2);
            let quote = book
                .tick_price("MTNN", test.input, &mut rng, Utc::now())
                .unwrap();
            assert_eq!(quote.price, test.expected, "TC{} failed", index);
            assert_eq!(quote.change_percent, 0.0, "TC{} failed", index);
        }
    }

    #[test]
    fn test_tick_unknown_symbol() {
        let mut book = book(0);
        let mut rng = StdRng::seed_from_u64(0);

        assert!(book.tick_price("NOPE", 0.02, &mut rng, Utc::now()).is_none());
        assert!(book.tick_volume("NOPE", 25_000, 100_000, &mut rng, Utc::now()).is_none());
    }

    #[test]
    fn test_tick_volume_respects_floor() {
        let mut book = book(11);
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..200 {
            let volume = book
                .tick_volume("ZENITH", 400_000, 100_000, &mut rng, Utc::now())
                .unwrap();
            assert!(volume >= 100_000);
        }
    }

    #[test]
    fn test_top_by_volume_is_sorted_unique_and_bounded() {
        let book = book(21);
        let top = book.top_by_volume(8);

        assert_eq!(top.len(), 8);
        assert_eq!(top.iter().unique().count(), 8);

        let volumes: Vec<u64> = top.iter().map(|s| book.get(s).unwrap().volume).collect();
        assert!(volumes.windows(2).all(|w| w[0] >= w[1]));

        let max = book.snapshot().iter().map(|q| q.volume).max().unwrap();
        assert_eq!(volumes[0], max);
    }

    #[test]
    fn test_snapshot_by_volume_descending() {
        let book = book(8);
        let snapshot = book.snapshot_by_volume();

        assert_eq!(snapshot.len(), book.len());
        assert!(snapshot.windows(2).all(|w| w[0].volume >= w[1].volume));
    }

    #[test]
    fn test_round_kobo() {
        struct TestCase {
            input: f64,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: already whole kobo
                input: 48.50,
                expected: 48.50,
            },
            TestCase {
                // TC1: rounds down
                input: 591.6049,
                expected: 591.60,
            },
            TestCase {
                // TC2: rounds half away from zero
                input: 0.125,
                expected: 0.13,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = round_kobo(test.input);
            assert!((actual - test.expected).abs() < 1e-9, "TC{} failed", index);
        }
    }
}
