/// Market view state reconciled from [`MarketSimulator`] events
///
/// Folds snapshots and per-symbol patches into a renderable quote list and a
/// volume-ranked watchlist. Mounting the view owns the simulator connection.
use chrono::{DateTime, Utc};
use ngx_data::{
    bus::{handler, Handler},
    error::DataError,
    market::{MarketEvent, MarketEventKind, MarketSimulator},
    quote::Quote,
};
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::{cmp::Reverse, collections::HashSet, sync::Arc};
use tracing::{info, warn};

/// Number of symbols ranked into the watchlist on every snapshot
pub const WATCHLIST_SIZE: usize = 8;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketViewState {
    pub quotes: Vec<Quote>,
    pub watchlist: Vec<SmolStr>,
    pub connected: bool,
    pub error: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
}

impl MarketViewState {
    /// Replace the quote list wholesale and re-rank the watchlist
    ///
    /// Entries without a symbol are dropped, as are repeats of a symbol already seen.
    pub fn apply_market_data(&mut self, quotes: &[Quote], time: DateTime<Utc>) {
        let mut seen = HashSet::with_capacity(quotes.len());
        self.quotes = quotes
            .iter()
            .filter(|quote| !quote.symbol.trim().is_empty())
            .filter(|quote| seen.insert(quote.symbol.clone()))
            .cloned()
            .collect();

        let mut ranked: Vec<&Quote> = self.quotes.iter().collect();
        ranked.sort_by_key(|quote| Reverse(quote.volume));
        self.watchlist = ranked
            .into_iter()
            .take(WATCHLIST_SIZE)
            .map(|quote| quote.symbol.clone())
            .collect();

        self.last_update = Some(time);
    }

    /// Patch the matching quote in place. Unknown symbols are ignored.
    pub fn apply_price(&mut self, quote: &Quote) -> bool {
        match self.quotes.iter_mut().find(|q| q.symbol == quote.symbol) {
            Some(existing) => {
                *existing = quote.clone();
                self.last_update = Some(quote.last_update);
                true
            }
            None => false,
        }
    }

    /// Patch the matching quote's volume in place. Unknown symbols are ignored.
    pub fn apply_volume(&mut self, symbol: &str, volume: u64, time: DateTime<Utc>) -> bool {
        match self.quotes.iter_mut().find(|q| q.symbol == symbol) {
            Some(existing) => {
                existing.volume = volume;
                existing.last_update = time;
                self.last_update = Some(time);
                true
            }
            None => false,
        }
    }

    /// Returns false if `symbol` was already watched
    pub fn add_to_watchlist(&mut self, symbol: &str) -> bool {
        if self.watchlist.iter().any(|watched| watched == symbol) {
            return false;
        }
        self.watchlist.push(SmolStr::new(symbol));
        true
    }

    pub fn remove_from_watchlist(&mut self, symbol: &str) -> bool {
        let before = self.watchlist.len();
        self.watchlist.retain(|watched| watched != symbol);
        self.watchlist.len() != before
    }

    pub fn quote(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.iter().find(|quote| quote.symbol == symbol)
    }

    /// Watchlist quotes in watchlist order, skipping symbols without a quote
    pub fn watchlist_quotes(&self) -> Vec<Quote> {
        self.watchlist
            .iter()
            .filter_map(|symbol| self.quote(symbol).cloned())
            .collect()
    }
}

/// Mounted market view. Unmounting (or dropping) unsubscribes and disconnects the simulator.
pub struct MarketView {
    market: MarketSimulator,
    state: Arc<RwLock<MarketViewState>>,
    subscriptions: Vec<(MarketEventKind, Handler<MarketEvent>)>,
}

impl std::fmt::Debug for MarketView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketView")
            .field("mounted", &self.is_mounted())
            .field("quotes", &self.state.read().quotes.len())
            .finish()
    }
}

impl MarketView {
    /// Subscribe to `market`, seed from its current snapshot and connect it
    ///
    /// A link failure is not fatal: the simulator keeps retrying in the background and the
    /// failure is surfaced through [`MarketViewState::error`].
    pub fn mount(market: MarketSimulator) -> Result<Self, DataError> {
        let state = Arc::new(RwLock::new(MarketViewState::default()));

        let subscriptions = vec![
            (MarketEventKind::MarketData, Self::on_market_data(&state)),
            (MarketEventKind::PriceUpdate, Self::on_price_update(&state)),
            (MarketEventKind::VolumeUpdate, Self::on_volume_update(&state)),
            (MarketEventKind::Connected, Self::on_connection(&state)),
            (MarketEventKind::Disconnected, Self::on_connection(&state)),
            (MarketEventKind::Reconnecting, Self::on_connection(&state)),
            (MarketEventKind::ConnectionFailed, Self::on_connection(&state)),
        ];
        for (kind, handler) in &subscriptions {
            market.subscribe(*kind, Arc::clone(handler));
        }

        // Covers the gap before the first snapshot timer fires
        state
            .write()
            .apply_market_data(&market.market_data(), Utc::now());

        let view = Self {
            market,
            state,
            subscriptions,
        };

        match view.market.connect() {
            Ok(()) => {}
            Err(error) if error.is_terminal() => return Err(error),
            Err(error) => {
                warn!(%error, "market view mounted while simulator link is down");
                // Keep the retry status published by the Reconnecting handler
                view.state
                    .write()
                    .error
                    .get_or_insert_with(|| error.to_string());
            }
        }

        info!(quotes = view.state.read().quotes.len(), "market view mounted");
        Ok(view)
    }

    /// Unsubscribe every handler and disconnect the simulator. Idempotent.
    pub fn unmount(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }

        for (kind, handler) in self.subscriptions.drain(..) {
            self.market.unsubscribe(kind, &handler);
        }
        self.market.disconnect();
        info!("market view unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn market(&self) -> &MarketSimulator {
        &self.market
    }

    /// Snapshot of the current view state
    pub fn state(&self) -> MarketViewState {
        self.state.read().clone()
    }

    pub fn quotes(&self) -> Vec<Quote> {
        self.state.read().quotes.clone()
    }

    pub fn watchlist(&self) -> Vec<SmolStr> {
        self.state.read().watchlist.clone()
    }

    pub fn watchlist_quotes(&self) -> Vec<Quote> {
        self.state.read().watchlist_quotes()
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    pub fn add_to_watchlist(&self, symbol: &str) -> bool {
        self.state.write().add_to_watchlist(symbol)
    }

    pub fn remove_from_watchlist(&self, symbol: &str) -> bool {
        self.state.write().remove_from_watchlist(symbol)
    }

    fn on_market_data(state: &Arc<RwLock<MarketViewState>>) -> Handler<MarketEvent> {
        let state = Arc::clone(state);
        handler(move |event: &MarketEvent| {
            if let MarketEvent::MarketData { time, quotes } = event {
                state.write().apply_market_data(quotes, *time);
            }
            Ok(())
        })
    }

    fn on_price_update(state: &Arc<RwLock<MarketViewState>>) -> Handler<MarketEvent> {
        let state = Arc::clone(state);
        handler(move |event: &MarketEvent| {
            if let MarketEvent::PriceUpdate { quote, .. } = event {
                state.write().apply_price(quote);
            }
            Ok(())
        })
    }

    fn on_volume_update(state: &Arc<RwLock<MarketViewState>>) -> Handler<MarketEvent> {
        let state = Arc::clone(state);
        handler(move |event: &MarketEvent| {
            if let MarketEvent::VolumeUpdate {
                symbol,
                volume,
                time,
            } = event
            {
                state.write().apply_volume(symbol, *volume, *time);
            }
            Ok(())
        })
    }

    fn on_connection(state: &Arc<RwLock<MarketViewState>>) -> Handler<MarketEvent> {
        let state = Arc::clone(state);
        handler(move |event: &MarketEvent| {
            let mut state = state.write();
            match event {
                MarketEvent::Connected { .. } => {
                    state.connected = true;
                    state.error = None;
                }
                MarketEvent::Disconnected { .. } => state.connected = false,
                MarketEvent::Reconnecting { attempt, delay } => {
                    state.connected = false;
                    state.error = Some(format!(
                        "connection lost, retry {attempt} in {}s",
                        delay.as_secs()
                    ));
                }
                MarketEvent::ConnectionFailed { error, .. } => {
                    state.connected = false;
                    state.error = Some(error.to_string());
                }
                _ => {}
            }
            Ok(())
        })
    }
}

impl Drop for MarketView {
    fn drop(&mut self) {
        self.unmount();
    }
}
