//! Simulated NGX market data service.
//!
//! [`MarketSimulator`] owns the [`InstrumentCatalog`] and the [`QuoteBook`], and while
//! connected runs three independent timers:
//! - price tick: perturbs prices and publishes one [`MarketEvent::PriceUpdate`] per symbol.
//! - volume tick: perturbs volumes and publishes one [`MarketEvent::VolumeUpdate`] per symbol.
//! - snapshot: publishes the full book, highest volume first, as [`MarketEvent::MarketData`].
//!
//! The "connection" is synthetic. Opening it goes through a [`Link`], which lets tests inject
//! failures to exercise the linear-backoff reconnect policy.

use crate::{
    bus::{Event, EventBus, Handler},
    config::{MarketSimConfig, TickScope},
    error::DataError,
    instrument::InstrumentCatalog,
    quote::{Quote, QuoteBook},
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    runtime::Handle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events published by the [`MarketSimulator`].
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Connected {
        time: DateTime<Utc>,
    },
    Disconnected {
        time: DateTime<Utc>,
    },
    /// A retry has been scheduled after a failed connection attempt.
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
    /// Reconnect attempts are exhausted. Terminal until [`MarketSimulator::connect`] is
    /// called again.
    ConnectionFailed {
        attempts: u32,
        error: DataError,
    },
    /// Full quote book, highest volume first.
    MarketData {
        time: DateTime<Utc>,
        quotes: Vec<Quote>,
    },
    PriceUpdate {
        symbol: SmolStr,
        quote: Quote,
        time: DateTime<Utc>,
    },
    VolumeUpdate {
        symbol: SmolStr,
        volume: u64,
        time: DateTime<Utc>,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum MarketEventKind {
    Connected,
    Disconnected,
    Reconnecting,
    ConnectionFailed,
    MarketData,
    PriceUpdate,
    VolumeUpdate,
}

impl Event for MarketEvent {
    type Kind = MarketEventKind;

    fn kind(&self) -> Self::Kind {
        match self {
            MarketEvent::Connected { .. } => MarketEventKind::Connected,
            MarketEvent::Disconnected { .. } => MarketEventKind::Disconnected,
            MarketEvent::Reconnecting { .. } => MarketEventKind::Reconnecting,
            MarketEvent::ConnectionFailed { .. } => MarketEventKind::ConnectionFailed,
            MarketEvent::MarketData { .. } => MarketEventKind::MarketData,
            MarketEvent::PriceUpdate { .. } => MarketEventKind::PriceUpdate,
            MarketEvent::VolumeUpdate { .. } => MarketEventKind::VolumeUpdate,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize, Display)]
pub enum ConnectionState {
    #[default]
    #[display("DISCONNECTED")]
    Disconnected,
    #[display("LIVE")]
    Connected,
    #[display("RECONNECTING")]
    Reconnecting,
    /// Reconnect attempts exhausted.
    #[display("FAILED")]
    Failed,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub last_update: DateTime<Utc>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Opens the simulated feed connection.
pub trait Link: Send + Sync + 'static {
    fn open(&self) -> Result<(), DataError>;
}

/// [`Link`] that always opens successfully.
#[derive(Debug, Copy, Clone, Default)]
pub struct AlwaysUp;

impl Link for AlwaysUp {
    fn open(&self) -> Result<(), DataError> {
        Ok(())
    }
}

#[derive(Debug)]
struct Session {
    state: ConnectionState,
    reconnect_attempts: u32,
    last_update: DateTime<Utc>,
    timers: Option<CancellationToken>,
    retry: Option<CancellationToken>,
}

impl Session {
    fn cancel_all(&mut self) {
        if let Some(timers) = self.timers.take() {
            timers.cancel();
        }
        if let Some(retry) = self.retry.take() {
            retry.cancel();
        }
    }
}

struct Inner {
    config: MarketSimConfig,
    catalog: InstrumentCatalog,
    book: RwLock<QuoteBook>,
    bus: EventBus<MarketEvent>,
    link: Box<dyn Link>,
    rng: Mutex<StdRng>,
    session: Mutex<Session>,
}

/// Handle to a simulated market data service. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct MarketSimulator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MarketSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketSimulator")
            .field("instruments", &self.inner.catalog.len())
            .field("session", &*self.inner.session.lock())
            .field("bus", &self.inner.bus)
            .finish()
    }
}

impl MarketSimulator {
    /// Simulator over the NGX catalog with a link that never fails.
    pub fn new(config: MarketSimConfig) -> Self {
        Self::from_parts(config, InstrumentCatalog::ngx(), AlwaysUp)
    }

    pub fn from_parts(config: MarketSimConfig, catalog: InstrumentCatalog, link: impl Link) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let book = QuoteBook::new(&catalog, &mut rng, Utc::now());

        Self {
            inner: Arc::new(Inner {
                config,
                catalog,
                book: RwLock::new(book),
                bus: EventBus::new(),
                link: Box::new(link),
                rng: Mutex::new(rng),
                session: Mutex::new(Session {
                    state: ConnectionState::Disconnected,
                    reconnect_attempts: 0,
                    last_update: Utc::now(),
                    timers: None,
                    retry: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> &MarketSimConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &InstrumentCatalog {
        &self.inner.catalog
    }

    pub fn bus(&self) -> &EventBus<MarketEvent> {
        &self.inner.bus
    }

    pub fn subscribe(&self, kind: MarketEventKind, handler: Handler<MarketEvent>) {
        self.inner.bus.subscribe(kind, handler);
    }

    pub fn unsubscribe(&self, kind: MarketEventKind, handler: &Handler<MarketEvent>) -> bool {
        self.inner.bus.unsubscribe(kind, handler)
    }

    /// Open the simulated link and start the tick timers.
    ///
    /// Connecting while already connected is a no-op. If the link fails to open, a retry is
    /// scheduled and the link error is returned; once retries are exhausted a
    /// [`MarketEvent::ConnectionFailed`] is published.
    pub fn connect(&self) -> Result<(), DataError> {
        let runtime = Handle::try_current().map_err(|_| DataError::NoRuntime)?;

        {
            let mut session = self.inner.session.lock();
            if session.state == ConnectionState::Connected {
                debug!("market simulator already connected");
                return Ok(());
            }
            // Explicit connects start a fresh retry budget
            session.reconnect_attempts = 0;
        }

        self.attempt(&runtime)
    }

    /// Stop every timer (and any pending reconnect). Idempotent.
    pub fn disconnect(&self) {
        let was_active = {
            let mut session = self.inner.session.lock();
            session.cancel_all();
            let was_active = matches!(
                session.state,
                ConnectionState::Connected | ConnectionState::Reconnecting
            );
            session.state = ConnectionState::Disconnected;
            session.last_update = Utc::now();
            was_active
        };

        if was_active {
            info!("market simulator disconnected");
            self.inner
                .bus
                .publish(&MarketEvent::Disconnected { time: Utc::now() });
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        let session = self.inner.session.lock();
        ConnectionStatus {
            state: session.state,
            reconnect_attempts: session.reconnect_attempts,
            last_update: session.last_update,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.lock().state == ConnectionState::Connected
    }

    /// Full quote snapshot in catalog order.
    pub fn market_data(&self) -> Vec<Quote> {
        self.inner.book.read().snapshot()
    }

    pub fn stock_data(&self, symbol: &str) -> Result<Quote, DataError> {
        self.inner
            .book
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::UnknownSymbol(SmolStr::new(symbol)))
    }

    /// Top `watchlist_size` symbols by volume, highest first.
    pub fn watchlist(&self) -> Vec<SmolStr> {
        self.inner
            .book
            .read()
            .top_by_volume(self.inner.config.watchlist_size)
    }

    /// Run one price tick now. Does nothing while disconnected.
    pub fn tick_prices(&self) -> usize {
        if !self.is_connected() {
            return 0;
        }

        let now = Utc::now();
        let volatility = self.inner.config.volatility;
        let updates: Vec<Quote> = {
            let mut rng = self.inner.rng.lock();
            let mut book = self.inner.book.write();

            let symbols: Vec<SmolStr> = match self.inner.config.tick_scope {
                TickScope::All => book.symbols().cloned().collect(),
                TickScope::Single if book.is_empty() => Vec::new(),
                TickScope::Single => {
                    let index = rng.random_range(0..book.len());
                    book.symbol_at(index).cloned().into_iter().collect()
                }
            };

            symbols
                .iter()
                .filter_map(|symbol| book.tick_price(symbol, volatility, &mut *rng, now))
                .collect()
        };

        let count = updates.len();
        for quote in updates {
            self.inner.bus.publish(&MarketEvent::PriceUpdate {
                symbol: quote.symbol.clone(),
                quote,
                time: now,
            });
        }
        count
    }

    /// Run one volume tick now. Does nothing while disconnected.
    pub fn tick_volumes(&self) -> usize {
        if !self.is_connected() {
            return 0;
        }

        let now = Utc::now();
        let MarketSimConfig {
            volume_delta,
            volume_floor,
            ..
        } = self.inner.config;
        let updates: Vec<(SmolStr, u64)> = {
            let mut rng = self.inner.rng.lock();
            let mut book = self.inner.book.write();
            let symbols: Vec<SmolStr> = book.symbols().cloned().collect();

            symbols
                .into_iter()
                .filter_map(|symbol| {
                    book.tick_volume(&symbol, volume_delta, volume_floor, &mut *rng, now)
                        .map(|volume| (symbol, volume))
                })
                .collect()
        };

        let count = updates.len();
        for (symbol, volume) in updates {
            self.inner.bus.publish(&MarketEvent::VolumeUpdate {
                symbol,
                volume,
                time: now,
            });
        }
        count
    }

    /// Publish the full book now. Does nothing while disconnected.
    pub fn broadcast_snapshot(&self) -> bool {
        if !self.is_connected() {
            return false;
        }

        let quotes = self.inner.book.read().snapshot_by_volume();
        self.inner.bus.publish(&MarketEvent::MarketData {
            time: Utc::now(),
            quotes,
        });
        true
    }

    fn attempt(&self, runtime: &Handle) -> Result<(), DataError> {
        match self.inner.link.open() {
            Ok(()) => {
                self.on_open(runtime);
                Ok(())
            }
            Err(error) => {
                warn!(%error, "market simulator link failed to open");
                self.schedule_reconnect(runtime, error.clone());
                Err(error)
            }
        }
    }

    fn on_open(&self, runtime: &Handle) {
        let timers = CancellationToken::new();
        {
            let mut session = self.inner.session.lock();
            session.cancel_all();
            session.state = ConnectionState::Connected;
            session.reconnect_attempts = 0;
            session.last_update = Utc::now();
            session.timers = Some(timers.clone());
        }

        let config = &self.inner.config;
        self.spawn_timer(runtime, config.price_tick_interval, timers.clone(), |sim| {
            sim.tick_prices();
        });
        self.spawn_timer(runtime, config.volume_tick_interval, timers.clone(), |sim| {
            sim.tick_volumes();
        });
        self.spawn_timer(runtime, config.snapshot_interval, timers, |sim| {
            sim.broadcast_snapshot();
        });

        info!(
            instruments = self.inner.catalog.len(),
            "market simulator connected"
        );
        self.inner
            .bus
            .publish(&MarketEvent::Connected { time: Utc::now() });
    }

    fn schedule_reconnect(&self, runtime: &Handle, error: DataError) {
        let max_attempts = self.inner.config.max_reconnect_attempts;

        let scheduled = {
            let mut session = self.inner.session.lock();
            session.cancel_all();
            session.last_update = Utc::now();

            if session.reconnect_attempts < max_attempts {
                session.reconnect_attempts += 1;
                session.state = ConnectionState::Reconnecting;
                let attempt = session.reconnect_attempts;
                let delay = self.inner.config.reconnect_base_delay * attempt;
                let token = CancellationToken::new();
                session.retry = Some(token.clone());
                Some((attempt, delay, token))
            } else {
                session.state = ConnectionState::Failed;
                None
            }
        };

        match scheduled {
            Some((attempt, delay, token)) => {
                warn!(attempt, max_attempts, ?delay, %error, "scheduling market simulator reconnect");

                let weak = Arc::downgrade(&self.inner);
                let retry_runtime = runtime.clone();
                runtime.spawn(async move {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            if let Some(inner) = weak.upgrade() {
                                let sim = MarketSimulator { inner };
                                // Failure is handled by a further schedule_reconnect
                                let _ = sim.attempt(&retry_runtime);
                            }
                        }
                    }
                });

                self.inner
                    .bus
                    .publish(&MarketEvent::Reconnecting { attempt, delay });
            }
            None => {
                error!(max_attempts, %error, "market simulator reconnect attempts exhausted");
                self.inner.bus.publish(&MarketEvent::ConnectionFailed {
                    attempts: max_attempts,
                    error: DataError::ReconnectExhausted {
                        attempts: max_attempts,
                    },
                });
            }
        }
    }

    fn spawn_timer(
        &self,
        runtime: &Handle,
        period: Duration,
        token: CancellationToken,
        on_tick: fn(&MarketSimulator),
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
                        on_tick(&MarketSimulator { inner });
                    }
                }
            }
        });
    }
}
