use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which instruments a single price tick perturbs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
pub enum TickScope {
    /// Every instrument in the catalog moves on each tick.
    #[default]
    All,
    /// One randomly chosen instrument moves on each tick.
    Single,
}

/// [`MarketSimulator`](crate::market::MarketSimulator) configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketSimConfig {
    /// Period of the price perturbation timer
    #[serde(with = "millis")]
    pub price_tick_interval: Duration,
    /// Period of the volume perturbation timer
    #[serde(with = "millis")]
    pub volume_tick_interval: Duration,
    /// Period of the full-book `marketData` broadcast
    #[serde(with = "millis")]
    pub snapshot_interval: Duration,
    /// Max fractional move per tick, eg/ 0.02 => uniform in [-2%, +2%]
    pub volatility: f64,
    pub tick_scope: TickScope,
    /// Max absolute volume change per volume tick
    pub volume_delta: u64,
    pub volume_floor: u64,
    pub watchlist_size: usize,
    pub max_reconnect_attempts: u32,
    /// Retry `n` waits `n * reconnect_base_delay`
    #[serde(with = "millis")]
    pub reconnect_base_delay: Duration,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for MarketSimConfig {
    fn default() -> Self {
        Self {
            price_tick_interval: Duration::from_secs(2),
            volume_tick_interval: Duration::from_secs(5),
            snapshot_interval: Duration::from_secs(2),
            volatility: 0.02,
            tick_scope: TickScope::All,
            volume_delta: 25_000,
            volume_floor: 100_000,
            watchlist_size: 8,
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
            seed: None,
        }
    }
}

impl MarketSimConfig {
    pub fn with_price_tick_interval(mut self, interval: Duration) -> Self {
        self.price_tick_interval = interval;
        self
    }

    pub fn with_volume_tick_interval(mut self, interval: Duration) -> Self {
        self.volume_tick_interval = interval;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn with_tick_scope(mut self, scope: TickScope) -> Self {
        self.tick_scope = scope;
        self
    }

    pub fn with_reconnect_policy(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_base_delay = base_delay;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// [`NewsSimulator`](crate::news::NewsSimulator) configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NewsSimConfig {
    #[serde(with = "millis")]
    pub news_interval: Duration,
    #[serde(with = "millis")]
    pub alert_interval: Duration,
    pub news_capacity: usize,
    pub alert_capacity: usize,
    /// Absolute % move above which a quote raises a price alert
    pub mover_threshold_pct: f64,
    pub seed: Option<u64>,
}

impl Default for NewsSimConfig {
    fn default() -> Self {
        Self {
            news_interval: Duration::from_secs(30),
            alert_interval: Duration::from_secs(45),
            news_capacity: 20,
            alert_capacity: 15,
            mover_threshold_pct: 3.0,
            seed: None,
        }
    }
}

impl NewsSimConfig {
    pub fn with_news_interval(mut self, interval: Duration) -> Self {
        self.news_interval = interval;
        self
    }

    pub fn with_alert_interval(mut self, interval: Duration) -> Self {
        self.alert_interval = interval;
        self
    }

    pub fn with_capacities(mut self, news: usize, alerts: usize) -> Self {
        self.news_capacity = news;
        self.alert_capacity = alerts;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_config_builder() {
        let config = MarketSimConfig::default()
            .with_price_tick_interval(Duration::from_millis(500))
            .with_volatility(0.01)
            .with_tick_scope(TickScope::Single)
            .with_reconnect_policy(3, Duration::from_millis(250))
            .with_seed(7);

        assert_eq!(config.price_tick_interval, Duration::from_millis(500));
        assert_eq!(config.volatility, 0.01);
        assert_eq!(config.tick_scope, TickScope::Single);
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(250));
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_default_configs() {
        let market = MarketSimConfig::default();
        assert_eq!(market.price_tick_interval, Duration::from_secs(2));
        assert_eq!(market.volume_tick_interval, Duration::from_secs(5));
        assert_eq!(market.watchlist_size, 8);
        assert_eq!(market.volume_floor, 100_000);

        let news = NewsSimConfig::default();
        assert_eq!(news.news_interval, Duration::from_secs(30));
        assert_eq!(news.alert_interval, Duration::from_secs(45));
        assert_eq!(news.news_capacity, 20);
        assert_eq!(news.alert_capacity, 15);
    }
}
