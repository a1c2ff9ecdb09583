/// News and alert feed state reconciled from [`NewsSimulator`] events, plus a local book of
/// user-defined price alerts
use chrono::{DateTime, Utc};
use derive_more::Display;
use ngx_data::{
    bus::{handler, Handler},
    error::DataError,
    news::{Alert, AlertKind, NewsEvent, NewsEventKind, NewsItem, NewsSimulator, Priority},
    quote::Quote,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlertError {
    #[error("alert symbol is empty")]
    EmptySymbol,

    #[error("alert price must be positive, got {0}")]
    InvalidPrice(f64),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum AlertCondition {
    #[display("above")]
    Above,
    #[display("below")]
    Below,
}

impl AlertCondition {
    pub fn is_met(&self, price: f64, target: f64) -> bool {
        match self {
            AlertCondition::Above => price >= target,
            AlertCondition::Below => price <= target,
        }
    }
}

/// User-defined price threshold on one symbol
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceAlert {
    pub id: u64,
    pub symbol: SmolStr,
    pub condition: AlertCondition,
    pub price: f64,
    pub message: Option<String>,
    pub created: DateTime<Utc>,
    pub triggered: Option<DateTime<Utc>>,
}

impl PriceAlert {
    fn to_alert(&self, quote: &Quote, time: DateTime<Utc>) -> Alert {
        let message = self.message.clone().unwrap_or_else(|| {
            format!(
                "{} is {} ₦{:.2} at ₦{:.2}",
                self.symbol, self.condition, self.price, quote.price
            )
        });

        Alert {
            id: self.id,
            kind: AlertKind::Success,
            title: "Price Target".to_string(),
            message,
            priority: Priority::High,
            symbol: self.symbol.clone(),
            price: quote.price,
            time_label: SmolStr::new_static("Just now"),
            created: time,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsViewState {
    pub news: Vec<NewsItem>,
    pub alerts: Vec<Alert>,
    /// Most recent alert, shown until dismissed
    pub banner: Option<Alert>,
    pub price_alerts: Vec<PriceAlert>,
    news_capacity: usize,
    alert_capacity: usize,
}

impl NewsViewState {
    pub fn new(news_capacity: usize, alert_capacity: usize) -> Self {
        Self {
            news: Vec::new(),
            alerts: Vec::new(),
            banner: None,
            price_alerts: Vec::new(),
            news_capacity,
            alert_capacity,
        }
    }

    /// Replace both feeds with snapshots taken from the simulator (newest first)
    pub fn seed(&mut self, news: Vec<NewsItem>, alerts: Vec<Alert>) {
        self.news = news;
        self.news.truncate(self.news_capacity);
        self.alerts = alerts;
        self.alerts.truncate(self.alert_capacity);
        self.banner = self.alerts.first().cloned();
    }

    pub fn push_news(&mut self, item: NewsItem) {
        self.news.insert(0, item);
        self.news.truncate(self.news_capacity);
    }

    pub fn push_alert(&mut self, alert: Alert) {
        self.banner = Some(alert.clone());
        self.alerts.insert(0, alert);
        self.alerts.truncate(self.alert_capacity);
    }

    /// Remove the alert (feed entry and/or price alert) with `id`
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.alerts.len() + self.price_alerts.len();
        self.alerts.retain(|alert| alert.id != id);
        self.price_alerts.retain(|alert| alert.id != id);

        if self.banner.as_ref().is_some_and(|banner| banner.id == id) {
            self.banner = None;
        }
        self.alerts.len() + self.price_alerts.len() != before
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    /// Trigger every armed price alert whose condition holds for its symbol's quote
    ///
    /// Each alert triggers at most once and is pushed into the alert feed when it does.
    pub fn check_price_alerts(&mut self, quotes: &[Quote], time: DateTime<Utc>) -> Vec<PriceAlert> {
        let mut fired = Vec::new();

        for price_alert in self.price_alerts.iter_mut().filter(|a| a.triggered.is_none()) {
            let Some(quote) = quotes.iter().find(|q| q.symbol == price_alert.symbol) else {
                continue;
            };
            if price_alert.condition.is_met(quote.price, price_alert.price) {
                price_alert.triggered = Some(time);
                fired.push((price_alert.clone(), price_alert.to_alert(quote, time)));
            }
        }

        fired
            .into_iter()
            .map(|(price_alert, alert)| {
                self.push_alert(alert);
                price_alert
            })
            .collect()
    }
}

/// Mounted news view. Unmounting (or dropping) unsubscribes and stops the simulator.
pub struct NewsView {
    news: NewsSimulator,
    state: Arc<RwLock<NewsViewState>>,
    subscriptions: Vec<(NewsEventKind, Handler<NewsEvent>)>,
}

impl std::fmt::Debug for NewsView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("NewsView")
            .field("mounted", &self.is_mounted())
            .field("news", &state.news.len())
            .field("alerts", &state.alerts.len())
            .finish()
    }
}

impl NewsView {
    /// Seed from the simulator's current feeds, subscribe and start it
    pub fn mount(news: NewsSimulator) -> Result<Self, DataError> {
        let config = news.config();
        let mut state = NewsViewState::new(config.news_capacity, config.alert_capacity);
        state.seed(news.news(), news.alerts());
        let state = Arc::new(RwLock::new(state));

        let on_news = {
            let state = Arc::clone(&state);
            handler(move |event: &NewsEvent| {
                if let NewsEvent::News(item) = event {
                    state.write().push_news(item.clone());
                }
                Ok(())
            })
        };
        let on_alert = {
            let state = Arc::clone(&state);
            handler(move |event: &NewsEvent| {
                if let NewsEvent::Alert(alert) = event {
                    state.write().push_alert(alert.clone());
                }
                Ok(())
            })
        };

        let subscriptions = vec![
            (NewsEventKind::News, on_news),
            (NewsEventKind::Alert, on_alert),
        ];
        for (kind, handler) in &subscriptions {
            news.subscribe(*kind, Arc::clone(handler));
        }

        let view = Self {
            news,
            state,
            subscriptions,
        };
        view.news.start()?;

        let (news, alerts) = {
            let state = view.state.read();
            (state.news.len(), state.alerts.len())
        };
        info!(news, alerts, "news view mounted");
        Ok(view)
    }

    /// Unsubscribe and stop the simulator. Idempotent.
    pub fn unmount(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }

        for (kind, handler) in self.subscriptions.drain(..) {
            self.news.unsubscribe(kind, &handler);
        }
        self.news.stop();
        info!("news view unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn simulator(&self) -> &NewsSimulator {
        &self.news
    }

    pub fn state(&self) -> NewsViewState {
        self.state.read().clone()
    }

    pub fn news(&self) -> Vec<NewsItem> {
        self.state.read().news.clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.state.read().alerts.clone()
    }

    pub fn banner(&self) -> Option<Alert> {
        self.state.read().banner.clone()
    }

    pub fn price_alerts(&self) -> Vec<PriceAlert> {
        self.state.read().price_alerts.clone()
    }

    /// Arm a price alert on `symbol`. Ids come from the simulator so they never collide with
    /// feed alerts.
    pub fn add_alert(
        &self,
        symbol: &str,
        condition: AlertCondition,
        price: f64,
        message: Option<String>,
    ) -> Result<PriceAlert, AlertError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(AlertError::EmptySymbol);
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(AlertError::InvalidPrice(price));
        }

        let alert = PriceAlert {
            id: self.news.next_id(),
            symbol: SmolStr::new(symbol.to_uppercase()),
            condition,
            price,
            message: message.filter(|message| !message.trim().is_empty()),
            created: Utc::now(),
            triggered: None,
        };
        self.state.write().price_alerts.push(alert.clone());

        info!(id = alert.id, symbol = %alert.symbol, %condition, price, "price alert armed");
        Ok(alert)
    }

    pub fn dismiss(&self, id: u64) -> bool {
        let dismissed = self.state.write().dismiss(id);
        if !dismissed {
            warn!(id, "dismissed unknown alert");
        }
        dismissed
    }

    pub fn dismiss_banner(&self) {
        self.state.write().dismiss_banner();
    }

    pub fn check_price_alerts(&self, quotes: &[Quote]) -> Vec<PriceAlert> {
        self.state.write().check_price_alerts(quotes, Utc::now())
    }
}

impl Drop for NewsView {
    fn drop(&mut self) {
        self.unmount();
    }
}
