use ngx_data::{
    bus::handler,
    config::{MarketSimConfig, NewsSimConfig},
    market::{MarketEvent, MarketEventKind, MarketSimulator},
    news::NewsSimulator,
};
use ngx_terminal::{
    format_naira, format_percent, format_signed_naira, format_volume, AlertCondition, MarketView,
    NewsView, OrderRequest, TradingConfig, TradingDesk,
};
use std::{str::FromStr, time::Duration};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Interval between terminal status lines
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    init_logging();

    info!("Starting NGX terminal");

    let market_config = market_config();
    let news_config = news_config();
    let mover_threshold = news_config.mover_threshold_pct;
    info!(?market_config, ?news_config, "simulator configuration");

    let market = MarketSimulator::new(market_config);
    let news = NewsSimulator::new(news_config);

    // Large single-tick moves surface as price alerts on the news feed
    let movers = news.clone();
    market.subscribe(
        MarketEventKind::MarketData,
        handler(move |event: &MarketEvent| {
            if let MarketEvent::MarketData { quotes, .. } = event {
                movers.scan_movers(quotes, mover_threshold);
            }
            Ok(())
        }),
    );

    let mut market_view = match MarketView::mount(market.clone()) {
        Ok(view) => view,
        Err(error) => {
            error!(%error, "failed to mount market view");
            return;
        }
    };
    let mut news_view = match NewsView::mount(news.clone()) {
        Ok(view) => view,
        Err(error) => {
            error!(%error, "failed to mount news view");
            return;
        }
    };
    let trading_config = TradingConfig::default()
        .with_position("MTNN", 100.0, 152.30)
        .with_position("ZENITH", 500.0, 33.10)
        .with_position("DANGCEM", 50.0, 278.50);
    let mut desk = match TradingDesk::mount(market.clone(), trading_config) {
        Ok(desk) => desk,
        Err(error) => {
            error!(%error, "failed to mount trading desk");
            return;
        }
    };

    if let Err(error) = desk.place_order(OrderRequest::buy("ZENITH", 100.0)) {
        warn!(%error, "demo order rejected");
    }
    if let Ok(quote) = market.stock_data("MTNN") {
        if let Err(error) =
            news_view.add_alert("MTNN", AlertCondition::Above, quote.price * 1.02, None)
        {
            warn!(%error, "demo price alert rejected");
        }
    }

    // Run until Ctrl-C, or for NGX_RUN_SECS if set
    let run_for = std::env::var("NGX_RUN_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs);

    let shutdown = async {
        match run_for {
            Some(duration) => tokio::time::sleep(duration).await,
            None => {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    error!(%error, "failed to listen for Ctrl-C");
                }
            }
        }
    };
    tokio::pin!(shutdown);

    let mut status = interval_at(Instant::now() + STATUS_INTERVAL, STATUS_INTERVAL);
    status.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = status.tick() => {
                for triggered in news_view.check_price_alerts(&market_view.quotes()) {
                    info!(symbol = %triggered.symbol, price = triggered.price, "price alert triggered");
                }
                log_status(&market_view, &desk, &news_view);
            }
        }
    }

    info!("Shutting down NGX terminal");
    desk.unmount();
    news_view.unmount();
    market_view.unmount();
}

fn log_status(market_view: &MarketView, desk: &TradingDesk, news_view: &NewsView) {
    let status = market_view.market().connection_status();
    info!(
        state = %status.state,
        reconnect_attempts = status.reconnect_attempts,
        "connection"
    );

    for quote in market_view.watchlist_quotes() {
        info!(
            symbol = %quote.symbol,
            price = %format_naira(quote.price),
            change = %format_percent(quote.change_percent),
            volume = %format_volume(quote.volume),
            "watchlist"
        );
    }

    let summary = desk.portfolio_summary();
    info!(
        cash = %format_naira(summary.cash),
        market_value = %format_naira(summary.market_value),
        unrealized = %format_signed_naira(summary.unrealized_pnl),
        unrealized_pct = %format_percent(summary.unrealized_pnl_percent),
        realized = %format_signed_naira(summary.realized_pnl),
        total = %format_naira(summary.total_value),
        "portfolio"
    );
    match serde_json::to_string(&summary) {
        Ok(json) => tracing::debug!(%json, "portfolio summary"),
        Err(error) => warn!(%error, "failed to serialise portfolio summary"),
    }

    if let Some(error) = desk.last_error() {
        warn!(%error, "last order error");
        desk.clear_error();
    }

    if let Some(item) = news_view.news().first() {
        info!(source = %item.source, sentiment = %item.sentiment, "{}", item.title);
    }
    if let Some(banner) = news_view.banner() {
        info!(kind = %banner.kind, priority = %banner.priority, "{}: {}", banner.title, banner.message);
        news_view.dismiss_banner();
    }
}

fn market_config() -> MarketSimConfig {
    let defaults = MarketSimConfig::default();
    let mut config = defaults
        .clone()
        .with_price_tick_interval(env_millis("NGX_PRICE_TICK_MS", defaults.price_tick_interval))
        .with_volume_tick_interval(env_millis("NGX_VOLUME_TICK_MS", defaults.volume_tick_interval))
        .with_snapshot_interval(env_millis("NGX_SNAPSHOT_MS", defaults.snapshot_interval));

    if let Some(seed) = env_parse::<u64>("NGX_SEED") {
        config = config.with_seed(seed);
    }
    config
}

fn news_config() -> NewsSimConfig {
    let defaults = NewsSimConfig::default();
    let mut config = defaults
        .clone()
        .with_news_interval(env_millis("NGX_NEWS_MS", defaults.news_interval))
        .with_alert_interval(env_millis("NGX_ALERT_MS", defaults.alert_interval));

    // News stream is seeded one past the market seed
    if let Some(seed) = env_parse::<u64>("NGX_SEED") {
        config = config.with_seed(seed.wrapping_add(1));
    }
    config
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env_parse::<u64>(key)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
