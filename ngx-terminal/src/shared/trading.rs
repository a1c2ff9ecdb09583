/// Local order book and position ledger
///
/// Orders are priced against [`MarketSimulator`] quotes and fill after a fixed simulated
/// latency. Positions are re-marked on every `PriceUpdate` and on a periodic reconciliation
/// timer. Nothing here writes into simulator state.
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use indexmap::IndexMap;
use ngx_data::{
    bus::{handler, Handler},
    error::DataError,
    id::IdClock,
    market::{MarketEvent, MarketEventKind, MarketSimulator},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    runtime::Handle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Remaining quantity at or below this closes the position
const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error, Deserialize, Serialize)]
pub enum TradeError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(SmolStr),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("insufficient balance: order costs {required:.2} but only {available:.2} is available")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("insufficient shares of {symbol}: requested {requested} but holding {held}")]
    InsufficientShares {
        symbol: SmolStr,
        requested: f64,
        held: f64,
    },

    #[error("trading desk is unmounted")]
    Unmounted,

    #[error(transparent)]
    Data(DataError),
}

impl From<DataError> for TradeError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::UnknownSymbol(symbol) => TradeError::UnknownSymbol(symbol),
            other => TradeError::Data(other),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum OrderSide {
    #[display("BUY")]
    Buy,
    #[display("SELL")]
    Sell,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Deserialize, Serialize, Display)]
pub enum OrderKind {
    #[default]
    #[display("MARKET")]
    Market,
    #[display("LIMIT")]
    Limit,
    #[display("STOP")]
    Stop,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum OrderStatus {
    #[display("PENDING")]
    Pending,
    /// Fill attempted. The balance/position effect may still have been rejected, see
    /// [`TradingDesk::last_error`].
    #[display("EXECUTED")]
    Executed,
    #[display("CANCELLED")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct OrderRequest {
    pub symbol: SmolStr,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: f64,
    /// `None` fills at the quote price seen at placement
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn buy(symbol: impl Into<SmolStr>, quantity: f64) -> Self {
        Self::new(symbol.into(), OrderSide::Buy, OrderKind::Market, quantity, None)
    }

    pub fn sell(symbol: impl Into<SmolStr>, quantity: f64) -> Self {
        Self::new(symbol.into(), OrderSide::Sell, OrderKind::Market, quantity, None)
    }

    /// Fill at an explicit price instead of the current quote
    pub fn at_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn limit(mut self, price: f64) -> Self {
        self.kind = OrderKind::Limit;
        self.price = Some(price);
        self
    }

    pub fn stop(mut self, price: f64) -> Self {
        self.kind = OrderKind::Stop;
        self.price = Some(price);
        self
    }

    pub fn validate(&self) -> Result<(), TradeError> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(TradeError::InvalidOrder(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }

        match (self.kind, self.price) {
            (_, Some(price)) if !price.is_finite() || price <= 0.0 => Err(
                TradeError::InvalidOrder(format!("price must be positive, got {price}")),
            ),
            (OrderKind::Limit | OrderKind::Stop, None) => Err(TradeError::InvalidOrder(format!(
                "{} order requires a price",
                self.kind
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub id: u64,
    pub symbol: SmolStr,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: f64,
    pub price: f64,
    pub status: OrderStatus,
    pub created: DateTime<Utc>,
    pub executed: Option<DateTime<Utc>>,
}

impl Order {
    pub fn value(&self) -> f64 {
        self.price * self.quantity
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub symbol: SmolStr,
    pub quantity: f64,
    pub avg_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percent: f64,
    pub last_update: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: SmolStr, quantity: f64, avg_price: f64, time: DateTime<Utc>) -> Self {
        Self {
            symbol,
            quantity,
            avg_price,
            current_price: avg_price,
            unrealized_pnl: 0.0,
            unrealized_pnl_percent: 0.0,
            last_update: time,
        }
    }

    pub fn market_value(&self) -> f64 {
        self.quantity * self.current_price
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.avg_price
    }

    /// Re-mark against `price`, recomputing unrealized P&L
    pub fn mark(&mut self, price: f64, time: DateTime<Utc>) {
        self.current_price = price;
        self.unrealized_pnl = (price - self.avg_price) * self.quantity;
        self.unrealized_pnl_percent = if self.avg_price > 0.0 {
            (price - self.avg_price) / self.avg_price * 100.0
        } else {
            0.0
        };
        self.last_update = time;
    }

    /// Blend a fill into the volume weighted average entry price
    fn add(&mut self, quantity: f64, price: f64) {
        let total = self.quantity + quantity;
        self.avg_price = (self.avg_price * self.quantity + price * quantity) / total;
        self.quantity = total;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct PortfolioSummary {
    pub cash: f64,
    pub market_value: f64,
    pub invested: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percent: f64,
    pub realized_pnl: f64,
    pub total_value: f64,
}

/// Holding the ledger starts with
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct SeedPosition {
    pub symbol: SmolStr,
    pub quantity: f64,
    pub avg_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradingConfig {
    pub initial_balance: f64,
    /// Delay between placement and fill
    pub fill_latency: Duration,
    /// Period of the position re-marking timer
    pub reconcile_interval: Duration,
    pub positions: Vec<SeedPosition>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            initial_balance: 1_000_000.0,
            fill_latency: Duration::from_secs(1),
            reconcile_interval: Duration::from_secs(5),
            positions: Vec::new(),
        }
    }
}

impl TradingConfig {
    pub fn with_initial_balance(mut self, balance: f64) -> Self {
        self.initial_balance = balance;
        self
    }

    pub fn with_fill_latency(mut self, latency: Duration) -> Self {
        self.fill_latency = latency;
        self
    }

    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    pub fn with_position(mut self, symbol: impl Into<SmolStr>, quantity: f64, avg_price: f64) -> Self {
        self.positions
            .push(SeedPosition::new(symbol.into(), quantity, avg_price));
        self
    }

    pub fn with_positions(mut self, positions: impl IntoIterator<Item = SeedPosition>) -> Self {
        self.positions.extend(positions);
        self
    }
}

/// Cash, holdings and order history
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub balance: f64,
    pub positions: IndexMap<SmolStr, Position>,
    pub orders: Vec<Order>,
    pub realized_pnl: f64,
    pub last_error: Option<TradeError>,
}

impl Ledger {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            positions: IndexMap::new(),
            orders: Vec::new(),
            realized_pnl: 0.0,
            last_error: None,
        }
    }

    /// Transition the pending order `id` to executed and apply its effect.
    ///
    /// A rejected effect leaves the order executed, records `last_error` and returns the
    /// error. Returns `Ok(None)` if `id` is not pending.
    pub fn execute(
        &mut self,
        id: u64,
        mark: Option<f64>,
        time: DateTime<Utc>,
    ) -> Result<Option<Order>, TradeError> {
        let Some(order) = self
            .orders
            .iter_mut()
            .find(|order| order.id == id && order.status == OrderStatus::Pending)
        else {
            return Ok(None);
        };
        order.status = OrderStatus::Executed;
        order.executed = Some(time);
        let order = order.clone();

        match self.apply_fill(&order, mark, time) {
            Ok(()) => {
                self.last_error = None;
                Ok(Some(order))
            }
            Err(error) => {
                self.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Apply a fill's cash and position effect, or reject it leaving the ledger untouched
    pub fn apply_fill(
        &mut self,
        order: &Order,
        mark: Option<f64>,
        time: DateTime<Utc>,
    ) -> Result<(), TradeError> {
        let value = order.value();

        match order.side {
            OrderSide::Buy => {
                if value > self.balance {
                    return Err(TradeError::InsufficientBalance {
                        required: value,
                        available: self.balance,
                    });
                }

                self.balance -= value;
                let position = self
                    .positions
                    .entry(order.symbol.clone())
                    .and_modify(|position| position.add(order.quantity, order.price))
                    .or_insert_with(|| {
                        Position::new(order.symbol.clone(), order.quantity, order.price, time)
                    });
                position.mark(mark.unwrap_or(order.price), time);
            }
            OrderSide::Sell => {
                let held = self
                    .positions
                    .get(&order.symbol)
                    .map_or(0.0, |position| position.quantity);

                let Some(position) = self
                    .positions
                    .get_mut(&order.symbol)
                    .filter(|_| held + QUANTITY_EPSILON >= order.quantity)
                else {
                    return Err(TradeError::InsufficientShares {
                        symbol: order.symbol.clone(),
                        requested: order.quantity,
                        held,
                    });
                };

                self.realized_pnl += (order.price - position.avg_price) * order.quantity;
                self.balance += value;
                position.quantity -= order.quantity;

                if position.quantity <= QUANTITY_EPSILON {
                    self.positions.shift_remove(&order.symbol);
                } else {
                    position.mark(mark.unwrap_or(order.price), time);
                }
            }
        }

        Ok(())
    }

    /// Re-mark the position in `symbol`, if any
    pub fn mark(&mut self, symbol: &str, price: f64, time: DateTime<Utc>) -> bool {
        match self.positions.get_mut(symbol) {
            Some(position) => {
                position.mark(price, time);
                true
            }
            None => false,
        }
    }

    /// Cancel every still pending order
    pub fn cancel_pending(&mut self) -> usize {
        self.orders
            .iter_mut()
            .filter(|order| order.status == OrderStatus::Pending)
            .fold(0, |cancelled, order| {
                order.status = OrderStatus::Cancelled;
                cancelled + 1
            })
    }

    pub fn summary(&self) -> PortfolioSummary {
        let (market_value, invested) = self
            .positions
            .values()
            .fold((0.0, 0.0), |(market_value, invested), position| {
                (
                    market_value + position.market_value(),
                    invested + position.cost_basis(),
                )
            });
        let unrealized_pnl = market_value - invested;

        PortfolioSummary {
            cash: self.balance,
            market_value,
            invested,
            unrealized_pnl,
            unrealized_pnl_percent: if invested > 0.0 {
                unrealized_pnl / invested * 100.0
            } else {
                0.0
            },
            realized_pnl: self.realized_pnl,
            total_value: self.balance + market_value,
        }
    }
}

struct Desk {
    market: MarketSimulator,
    config: TradingConfig,
    ledger: Mutex<Ledger>,
    ids: IdClock,
    shutdown: CancellationToken,
}

impl Desk {
    fn fill(&self, id: u64) {
        let symbol = {
            let ledger = self.ledger.lock();
            match ledger.orders.iter().find(|order| order.id == id) {
                Some(order) => order.symbol.clone(),
                None => return,
            }
        };
        let mark = self.market.stock_data(&symbol).ok().map(|quote| quote.price);

        let result = self.ledger.lock().execute(id, mark, Utc::now());
        match result {
            Ok(Some(order)) => info!(
                id,
                %symbol,
                side = %order.side,
                quantity = order.quantity,
                price = order.price,
                "order filled"
            ),
            Ok(None) => debug!(id, "order no longer pending"),
            Err(error) => warn!(id, %symbol, %error, "order executed but fill rejected"),
        }
    }

    fn reconcile(&self) -> usize {
        let symbols: Vec<SmolStr> = self.ledger.lock().positions.keys().cloned().collect();
        let quotes: Vec<(SmolStr, f64)> = symbols
            .into_iter()
            .filter_map(|symbol| {
                let price = self.market.stock_data(&symbol).ok()?.price;
                Some((symbol, price))
            })
            .collect();

        let now = Utc::now();
        let mut ledger = self.ledger.lock();
        quotes
            .iter()
            .filter(|(symbol, price)| ledger.mark(symbol, *price, now))
            .count()
    }
}

/// Mounted trading desk. Unmounting (or dropping) stops reconciliation and cancels in-flight
/// fills.
pub struct TradingDesk {
    desk: Arc<Desk>,
    subscription: Option<Handler<MarketEvent>>,
}

impl std::fmt::Debug for TradingDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingDesk")
            .field("mounted", &self.is_mounted())
            .field("ledger", &*self.desk.ledger.lock())
            .finish()
    }
}

impl TradingDesk {
    /// Seed the ledger, subscribe to price updates and start the reconciliation timer
    pub fn mount(market: MarketSimulator, config: TradingConfig) -> Result<Self, TradeError> {
        let runtime = Handle::try_current().map_err(|_| DataError::NoRuntime)?;

        let now = Utc::now();
        let mut ledger = Ledger::new(config.initial_balance);
        for seed in &config.positions {
            let mut position = Position::new(seed.symbol.clone(), seed.quantity, seed.avg_price, now);
            if let Ok(quote) = market.stock_data(&seed.symbol) {
                position.mark(quote.price, now);
            }
            ledger.positions.insert(seed.symbol.clone(), position);
        }

        let desk = Arc::new(Desk {
            market,
            config,
            ledger: Mutex::new(ledger),
            ids: IdClock::new(),
            shutdown: CancellationToken::new(),
        });

        let subscription = Self::on_price_update(Arc::downgrade(&desk));
        desk.market
            .subscribe(MarketEventKind::PriceUpdate, Arc::clone(&subscription));

        Self::spawn_reconciler(&runtime, &desk);

        info!(
            balance = desk.config.initial_balance,
            positions = desk.config.positions.len(),
            "trading desk mounted"
        );

        Ok(Self {
            desk,
            subscription: Some(subscription),
        })
    }

    /// Validate, price and queue an order. The fill happens after
    /// [`TradingConfig::fill_latency`].
    pub fn place_order(&self, request: OrderRequest) -> Result<Order, TradeError> {
        if self.desk.shutdown.is_cancelled() {
            return Err(TradeError::Unmounted);
        }
        request.validate()?;

        let quote = self.desk.market.stock_data(&request.symbol)?;
        let runtime = Handle::try_current().map_err(|_| DataError::NoRuntime)?;

        let order = Order {
            id: self.desk.ids.next_id(),
            symbol: quote.symbol.clone(),
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            price: request.price.unwrap_or(quote.price),
            status: OrderStatus::Pending,
            created: Utc::now(),
            executed: None,
        };
        self.desk.ledger.lock().orders.push(order.clone());

        let token = self.desk.shutdown.child_token();
        let desk = Arc::clone(&self.desk);
        let latency = self.desk.config.fill_latency;
        let id = order.id;
        runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => debug!(id, "order fill cancelled"),
                _ = tokio::time::sleep(latency) => desk.fill(id),
            }
        });

        info!(
            id,
            symbol = %order.symbol,
            side = %order.side,
            kind = %order.kind,
            quantity = order.quantity,
            price = order.price,
            "order placed"
        );
        Ok(order)
    }

    /// Re-mark every position against the latest quote. Returns the number re-marked.
    pub fn reconcile(&self) -> usize {
        self.desk.reconcile()
    }

    /// Stop reconciliation and cancel in-flight fills. Idempotent.
    pub fn unmount(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };

        self.desk
            .market
            .unsubscribe(MarketEventKind::PriceUpdate, &subscription);
        self.desk.shutdown.cancel();

        let cancelled = self.desk.ledger.lock().cancel_pending();
        info!(cancelled, "trading desk unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn config(&self) -> &TradingConfig {
        &self.desk.config
    }

    pub fn balance(&self) -> f64 {
        self.desk.ledger.lock().balance
    }

    pub fn positions(&self) -> Vec<Position> {
        self.desk.ledger.lock().positions.values().cloned().collect()
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.desk.ledger.lock().positions.get(symbol).cloned()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.desk.ledger.lock().orders.clone()
    }

    pub fn order(&self, id: u64) -> Option<Order> {
        self.desk
            .ledger
            .lock()
            .orders
            .iter()
            .find(|order| order.id == id)
            .cloned()
    }

    /// Error from the most recent fill, cleared by the next successful fill
    pub fn last_error(&self) -> Option<TradeError> {
        self.desk.ledger.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.desk.ledger.lock().last_error = None;
    }

    pub fn portfolio_summary(&self) -> PortfolioSummary {
        self.desk.ledger.lock().summary()
    }

    /// Snapshot of the full ledger
    pub fn ledger(&self) -> Ledger {
        self.desk.ledger.lock().clone()
    }

    fn on_price_update(desk: Weak<Desk>) -> Handler<MarketEvent> {
        handler(move |event: &MarketEvent| {
            if let MarketEvent::PriceUpdate {
                symbol,
                quote,
                time,
            } = event
            {
                if let Some(desk) = desk.upgrade() {
                    desk.ledger.lock().mark(symbol, quote.price, *time);
                }
            }
            Ok(())
        })
    }

    fn spawn_reconciler(runtime: &Handle, desk: &Arc<Desk>) {
        let period = desk.config.reconcile_interval.max(Duration::from_millis(1));
        let token = desk.shutdown.child_token();
        let desk = Arc::downgrade(desk);

        runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(desk) = desk.upgrade() else {
                            break;
                        };
                        let marked = desk.reconcile();
                        debug!(marked, "reconciled positions");
                    }
                }
            }
        });
    }
}

impl Drop for TradingDesk {
    fn drop(&mut self) {
        self.unmount();
    }
}
