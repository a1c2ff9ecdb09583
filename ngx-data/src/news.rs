//! Simulated news wire and alert feed.
//!
//! Two independent timers render templated headlines and alerts against random catalog
//! instruments. Both feeds are bounded, newest first.

use crate::{
    bus::{Event, EventBus, Handler},
    config::NewsSimConfig,
    error::DataError,
    id::IdClock,
    instrument::{Instrument, InstrumentCatalog},
    quote::Quote,
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    runtime::Handle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum Sentiment {
    #[display("positive")]
    Positive,
    #[display("neutral")]
    Neutral,
    #[display("negative")]
    Negative,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NewsItem {
    pub id: u64,
    pub title: String,
    pub excerpt: String,
    pub source: SmolStr,
    pub sentiment: Sentiment,
    pub symbol: SmolStr,
    pub time_label: SmolStr,
    pub published: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum AlertKind {
    #[display("info")]
    Info,
    #[display("warning")]
    Warning,
    #[display("success")]
    Success,
    #[display("error")]
    Error,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum Priority {
    #[display("medium")]
    Medium,
    #[display("high")]
    High,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Alert {
    pub id: u64,
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub symbol: SmolStr,
    pub price: f64,
    pub time_label: SmolStr,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewsEvent {
    News(NewsItem),
    Alert(Alert),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum NewsEventKind {
    News,
    Alert,
}

impl Event for NewsEvent {
    type Kind = NewsEventKind;

    fn kind(&self) -> Self::Kind {
        match self {
            NewsEvent::News(_) => NewsEventKind::News,
            NewsEvent::Alert(_) => NewsEventKind::Alert,
        }
    }
}

struct NewsTemplate {
    title: &'static str,
    excerpt: &'static str,
    source: &'static str,
    sentiment: Sentiment,
}

struct AlertTemplate {
    kind: AlertKind,
    title: &'static str,
    message: &'static str,
    priority: Priority,
}

static NEWS_TEMPLATES: [NewsTemplate; 8] = [
    NewsTemplate {
        title: "Nigerian Stock Exchange Records Strong Gains",
        excerpt: "The NSE All-Share Index rose by {percent}% today, led by {sector} stocks. {company} gained {gain}% to close at ₦{price}.",
        source: "Bloomberg",
        sentiment: Sentiment::Positive,
    },
    NewsTemplate {
        title: "Central Bank Announces New Monetary Policy",
        excerpt: "The CBN has introduced measures to stabilize the naira, affecting {sector} stocks. Market analysts expect {impact}.",
        source: "Reuters",
        sentiment: Sentiment::Neutral,
    },
    NewsTemplate {
        title: "Oil Prices Decline Amid Global Concerns",
        excerpt: "Global oil prices fell {percent}% as economic growth concerns weigh on energy stocks. {company} declined {loss}%.",
        source: "CNBC",
        sentiment: Sentiment::Negative,
    },
    NewsTemplate {
        title: "Banking Sector Shows Resilience",
        excerpt: "Nigerian banks demonstrate strong performance with {company} leading gains at {gain}%. Sector outlook remains positive.",
        source: "Financial Times",
        sentiment: Sentiment::Positive,
    },
    NewsTemplate {
        title: "Tech Stocks Rally on Innovation News",
        excerpt: "Technology sector sees renewed interest as {company} announces new digital initiatives. Stock up {gain}%.",
        source: "TechCrunch",
        sentiment: Sentiment::Positive,
    },
    NewsTemplate {
        title: "Consumer Goods Sector Faces Challenges",
        excerpt: "Rising input costs impact consumer goods companies. {company} reports {loss}% decline in quarterly earnings.",
        source: "BusinessDay",
        sentiment: Sentiment::Negative,
    },
    NewsTemplate {
        title: "Agriculture Stocks Benefit from Policy Changes",
        excerpt: "Government agricultural policies boost {company} shares by {gain}%. Sector expected to grow {percent}% this year.",
        source: "Guardian",
        sentiment: Sentiment::Positive,
    },
    NewsTemplate {
        title: "Healthcare Sector Innovation Drive",
        excerpt: "{company} announces breakthrough in pharmaceutical research, stock surges {gain}%. Healthcare index up {percent}%.",
        source: "Medical News",
        sentiment: Sentiment::Positive,
    },
];

static ALERT_TEMPLATES: [AlertTemplate; 4] = [
    AlertTemplate {
        kind: AlertKind::Info,
        title: "Price Alert: {symbol}",
        message: "{symbol} has {action} {percent}% today. Current price: ₦{price}",
        priority: Priority::Medium,
    },
    AlertTemplate {
        kind: AlertKind::Warning,
        title: "Volume Spike: {symbol}",
        message: "Unusual trading volume detected for {symbol}. Volume increased by {percent}%",
        priority: Priority::High,
    },
    AlertTemplate {
        kind: AlertKind::Success,
        title: "Target Reached: {symbol}",
        message: "{symbol} has reached your target price of ₦{price}. Consider taking profits.",
        priority: Priority::Medium,
    },
    AlertTemplate {
        kind: AlertKind::Error,
        title: "Stop Loss Triggered: {symbol}",
        message: "{symbol} has hit your stop loss at ₦{price}. Position automatically closed.",
        priority: Priority::High,
    },
];

static TIME_LABELS: [&str; 5] = [
    "Just now",
    "2 minutes ago",
    "5 minutes ago",
    "10 minutes ago",
    "15 minutes ago",
];

static IMPACTS: [&str; 3] = [
    "positive market reaction",
    "mixed market response",
    "cautious investor sentiment",
];

/// Placeholder values for a single rendered template.
#[derive(Debug, Default)]
struct Fill<'a> {
    company: &'a str,
    symbol: &'a str,
    sector: &'a str,
    percent: String,
    gain: String,
    loss: String,
    price: String,
    impact: &'a str,
    action: &'a str,
}

fn render(template: &str, fill: &Fill<'_>) -> String {
    [
        ("{company}", fill.company),
        ("{symbol}", fill.symbol),
        ("{sector}", fill.sector),
        ("{percent}", fill.percent.as_str()),
        ("{gain}", fill.gain.as_str()),
        ("{loss}", fill.loss.as_str()),
        ("{price}", fill.price.as_str()),
        ("{impact}", fill.impact),
        ("{action}", fill.action),
    ]
    .into_iter()
    .fold(template.to_string(), |text, (placeholder, value)| {
        text.replace(placeholder, value)
    })
}

fn push_bounded<T>(feed: &mut VecDeque<T>, item: T, capacity: usize) {
    feed.push_front(item);
    feed.truncate(capacity);
}

#[derive(Debug, Default)]
struct Feeds {
    news: VecDeque<NewsItem>,
    alerts: VecDeque<Alert>,
}

struct Inner {
    config: NewsSimConfig,
    catalog: InstrumentCatalog,
    bus: EventBus<NewsEvent>,
    rng: Mutex<StdRng>,
    feeds: RwLock<Feeds>,
    ids: IdClock,
    timers: Mutex<Option<CancellationToken>>,
}

/// Handle to the simulated news wire. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct NewsSimulator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for NewsSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let feeds = self.inner.feeds.read();
        f.debug_struct("NewsSimulator")
            .field("running", &self.is_running())
            .field("news", &feeds.news.len())
            .field("alerts", &feeds.alerts.len())
            .finish()
    }
}

impl NewsSimulator {
    pub fn new(config: NewsSimConfig) -> Self {
        Self::with_catalog(config, InstrumentCatalog::ngx())
    }

    pub fn with_catalog(config: NewsSimConfig, catalog: InstrumentCatalog) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            inner: Arc::new(Inner {
                config,
                catalog,
                bus: EventBus::new(),
                rng: Mutex::new(rng),
                feeds: RwLock::new(Feeds::default()),
                ids: IdClock::new(),
                timers: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &NewsSimConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &EventBus<NewsEvent> {
        &self.inner.bus
    }

    pub fn subscribe(&self, kind: NewsEventKind, handler: Handler<NewsEvent>) {
        self.inner.bus.subscribe(kind, handler);
    }

    pub fn unsubscribe(&self, kind: NewsEventKind, handler: &Handler<NewsEvent>) -> bool {
        self.inner.bus.unsubscribe(kind, handler)
    }

    /// Next id from the clock shared by news items and alerts
    pub fn next_id(&self) -> u64 {
        self.inner.ids.next_id()
    }

    pub fn is_running(&self) -> bool {
        self.inner.timers.lock().is_some()
    }

    /// Start the news and alert timers, emitting one of each immediately.
    ///
    /// Starting an already running simulator is a no-op.
    pub fn start(&self) -> Result<(), DataError> {
        let runtime = Handle::try_current().map_err(|_| DataError::NoRuntime)?;

        let token = {
            let mut timers = self.inner.timers.lock();
            if timers.is_some() {
                debug!("news simulator already running");
                return Ok(());
            }
            let token = CancellationToken::new();
            *timers = Some(token.clone());
            token
        };

        let config = &self.inner.config;
        self.spawn_timer(&runtime, config.news_interval, token.clone(), |sim| {
            sim.generate_news();
        });
        self.spawn_timer(&runtime, config.alert_interval, token, |sim| {
            sim.generate_alert();
        });

        info!(
            news_interval = ?config.news_interval,
            alert_interval = ?config.alert_interval,
            "news simulator started"
        );

        self.generate_news();
        self.generate_alert();
        Ok(())
    }

    /// Cancel both timers. Feeds are retained. Idempotent.
    pub fn stop(&self) {
        if let Some(token) = self.inner.timers.lock().take() {
            token.cancel();
            info!("news simulator stopped");
        }
    }

    /// Snapshot of the news feed, newest first.
    pub fn news(&self) -> Vec<NewsItem> {
        self.inner.feeds.read().news.iter().cloned().collect()
    }

    /// Snapshot of the alert feed, newest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.inner.feeds.read().alerts.iter().cloned().collect()
    }

    /// Render, store and publish one news item. `None` if the catalog is empty.
    pub fn generate_news(&self) -> Option<NewsItem> {
        let item = {
            let mut rng = self.inner.rng.lock();
            let instrument = self.random_instrument(&mut *rng)?;
            let template = NEWS_TEMPLATES.choose(&mut *rng)?;

            let fill = Fill {
                company: &instrument.name,
                symbol: &instrument.symbol,
                sector: instrument.sector.label(),
                percent: format!("{:.1}", rng.random_range(1.0..6.0)),
                gain: format!("{:.1}", rng.random_range(2.0..10.0)),
                loss: format!("{:.1}", rng.random_range(1.0..7.0)),
                price: format!("{:.2}", rng.random_range(50.0..1050.0)),
                impact: IMPACTS.choose(&mut *rng).copied().unwrap_or_default(),
                action: "",
            };

            NewsItem {
                id: self.inner.ids.next_id(),
                title: render(template.title, &fill),
                excerpt: render(template.excerpt, &fill),
                source: SmolStr::new_static(template.source),
                sentiment: template.sentiment,
                symbol: instrument.symbol.clone(),
                time_label: random_label(&mut *rng),
                published: Utc::now(),
            }
        };

        push_bounded(
            &mut self.inner.feeds.write().news,
            item.clone(),
            self.inner.config.news_capacity,
        );
        debug!(id = item.id, title = %item.title, "generated news");
        self.inner.bus.publish(&NewsEvent::News(item.clone()));
        Some(item)
    }

    /// Render, store and publish one alert. `None` if the catalog is empty.
    pub fn generate_alert(&self) -> Option<Alert> {
        let alert = {
            let mut rng = self.inner.rng.lock();
            let instrument = self.random_instrument(&mut *rng)?;
            let template = ALERT_TEMPLATES.choose(&mut *rng)?;
            let price: f64 = rng.random_range(50.0..550.0);

            let fill = Fill {
                company: &instrument.name,
                symbol: &instrument.symbol,
                sector: instrument.sector.label(),
                percent: format!("{:.1}", rng.random_range(2.0..12.0)),
                price: format!("{price:.2}"),
                action: if rng.random_bool(0.5) { "gained" } else { "lost" },
                ..Fill::default()
            };

            Alert {
                id: self.inner.ids.next_id(),
                kind: template.kind,
                title: render(template.title, &fill),
                message: render(template.message, &fill),
                priority: template.priority,
                symbol: instrument.symbol.clone(),
                price: crate::quote::round_kobo(price),
                time_label: random_label(&mut *rng),
                created: Utc::now(),
            }
        };

        self.push_alert(alert.clone());
        Some(alert)
    }

    /// Raise a high priority price alert for every quote that moved more than
    /// `threshold_pct` percent on its last tick.
    pub fn scan_movers(&self, quotes: &[Quote], threshold_pct: f64) -> Vec<Alert> {
        let threshold = threshold_pct.abs();

        let alerts: Vec<Alert> = quotes
            .iter()
            .filter(|quote| quote.change_percent.is_finite())
            .filter(|quote| quote.change_percent.abs() > threshold)
            .map(|quote| {
                let gaining = quote.change_percent > 0.0;
                Alert {
                    id: self.inner.ids.next_id(),
                    kind: if gaining {
                        AlertKind::Info
                    } else {
                        AlertKind::Warning
                    },
                    title: format!("Price Alert: {}", quote.symbol),
                    message: format!(
                        "{} has {} {:.2}% today. Current price: ₦{:.2}",
                        quote.symbol,
                        if gaining { "gained" } else { "lost" },
                        quote.change_percent.abs(),
                        quote.price
                    ),
                    priority: Priority::High,
                    symbol: quote.symbol.clone(),
                    price: quote.price,
                    time_label: SmolStr::new_static(TIME_LABELS[0]),
                    created: Utc::now(),
                }
            })
            .collect();

        for alert in &alerts {
            self.push_alert(alert.clone());
        }
        alerts
    }

    fn push_alert(&self, alert: Alert) {
        push_bounded(
            &mut self.inner.feeds.write().alerts,
            alert.clone(),
            self.inner.config.alert_capacity,
        );
        debug!(id = alert.id, symbol = %alert.symbol, "generated alert");
        self.inner.bus.publish(&NewsEvent::Alert(alert));
    }

    fn random_instrument<R: Rng>(&self, rng: &mut R) -> Option<&Instrument> {
        if self.inner.catalog.is_empty() {
            return None;
        }
        self.inner
            .catalog
            .get_index(rng.random_range(0..self.inner.catalog.len()))
    }

    fn spawn_timer(
        &self,
        runtime: &Handle,
        period: Duration,
        token: CancellationToken,
        on_tick: fn(&NewsSimulator),
    ) {
        let period = period.max(Duration::from_millis(1));
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        on_tick(&NewsSimulator { inner });
                    }
                }
            }
        });
    }
}

fn random_label<R: Rng>(rng: &mut R) -> SmolStr {
    TIME_LABELS
        .choose(rng)
        .copied()
        .map(SmolStr::new_static)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::handler, instrument::Sector};

    fn simulator() -> NewsSimulator {
        NewsSimulator::new(NewsSimConfig::default().with_seed(99))
    }

    fn record(sim: &NewsSimulator, kind: NewsEventKind) -> Arc<Mutex<Vec<NewsEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        sim.subscribe(
            kind,
            handler(move |event: &NewsEvent| {
                sink.lock().push(event.clone());
                Ok(())
            }),
        );
        log
    }

    fn quote(symbol: &str, price: f64, change_percent: f64) -> Quote {
        Quote {
            symbol: SmolStr::new(symbol),
            name: SmolStr::new(symbol),
            sector: Sector::Banking,
            price,
            change: 0.0,
            change_percent,
            volume: 100_000,
            high: price,
            low: price,
            open: price,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn test_render_substitutes_every_placeholder() {
        let fill = Fill {
            company: "Zenith Bank",
            symbol: "ZENITH",
            sector: "Banking",
            percent: "4.2".to_string(),
            gain: "3.0".to_string(),
            loss: "1.5".to_string(),
            price: "48.50".to_string(),
            impact: "mixed market response",
            action: "gained",
        };

        assert_eq!(
            render("{company} ({symbol}) {action} {percent}% at ₦{price}", &fill),
            "Zenith Bank (ZENITH) gained 4.2% at ₦48.50"
        );

        for template in &NEWS_TEMPLATES {
            let title = render(template.title, &fill);
            let excerpt = render(template.excerpt, &fill);
            assert!(!title.contains('{'), "unrendered title: {title}");
            assert!(!excerpt.contains('{'), "unrendered excerpt: {excerpt}");
        }
        for template in &ALERT_TEMPLATES {
            assert!(!render(template.title, &fill).contains('{'));
            assert!(!render(template.message, &fill).contains('{'));
        }
    }

    #[test]
    fn test_news_feed_evicts_oldest_beyond_capacity() {
        let sim = simulator();

        let generated: Vec<NewsItem> = (0..21).filter_map(|_| sim.generate_news()).collect();
        assert_eq!(generated.len(), 21);

        let feed = sim.news();
        assert_eq!(feed.len(), 20);
        assert_eq!(feed[0], generated[20]);
        assert_eq!(feed[19], generated[1]);
        assert!(!feed.contains(&generated[0]));
    }

    #[test]
    fn test_alert_feed_capacity() {
        let sim = simulator();
        for _ in 0..40 {
            sim.generate_alert();
        }

        let alerts = sim.alerts();
        assert_eq!(alerts.len(), 15);
        assert!(alerts.windows(2).all(|w| w[0].id > w[1].id));
        assert!(alerts.iter().all(|alert| (50.0..=550.0).contains(&alert.price)));
    }

    #[test]
    fn test_generated_news_references_catalog_instrument() {
        let sim = simulator();
        let catalog = InstrumentCatalog::ngx();

        for _ in 0..30 {
            let item = sim.generate_news().unwrap();
            assert!(catalog.contains(&item.symbol));
            assert!(!item.title.contains('{'));
            assert!(TIME_LABELS.contains(&item.time_label.as_str()));
        }
    }

    #[test]
    fn test_empty_catalog_generates_nothing() {
        let sim = NewsSimulator::with_catalog(NewsSimConfig::default(), InstrumentCatalog::new([]));
        let news = record(&sim, NewsEventKind::News);

        assert!(sim.generate_news().is_none());
        assert!(sim.generate_alert().is_none());
        assert!(news.lock().is_empty());
    }

    #[test]
    fn test_scan_movers() {
        let sim = simulator();
        let alerts = record(&sim, NewsEventKind::Alert);

        let raised = sim.scan_movers(
            &[
                quote("MTNN", 600.0, 3.5),
                quote("ZENITH", 46.0, -4.1),
                quote("GTCO", 50.0, 2.9),
                quote("FBNH", 30.0, -3.0),
            ],
            3.0,
        );

        assert_eq!(raised.len(), 2);
        assert_eq!(raised[0].symbol, "MTNN");
        assert_eq!(raised[0].kind, AlertKind::Info);
        assert_eq!(raised[1].symbol, "ZENITH");
        assert_eq!(raised[1].kind, AlertKind::Warning);
        assert!(raised.iter().all(|alert| alert.priority == Priority::High));
        assert_eq!(raised[1].title, "Price Alert: ZENITH");
        assert_eq!(raised[1].message, "ZENITH has lost 4.10% today. Current price: ₦46.00");

        assert_eq!(alerts.lock().len(), 2);
        assert_eq!(sim.alerts()[0].symbol, "ZENITH");
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        assert_eq!(simulator().start(), Err(DataError::NoRuntime));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_stop_halts_timers() {
        let sim = simulator();
        let news = record(&sim, NewsEventKind::News);
        let alerts = record(&sim, NewsEventKind::Alert);

        sim.start().unwrap();
        sim.start().unwrap();
        assert!(sim.is_running());
        assert_eq!(news.lock().len(), 1);
        assert_eq!(alerts.lock().len(), 1);

        // news at 30s & 60s, alert at 45s
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(news.lock().len(), 3);
        assert_eq!(alerts.lock().len(), 2);

        sim.stop();
        sim.stop();
        assert!(!sim.is_running());
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(news.lock().len(), 3);
        assert_eq!(alerts.lock().len(), 2);
        assert_eq!(sim.news().len(), 3);
    }
}
