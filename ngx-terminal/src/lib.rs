/// NGX Terminal - Shared Library
///
/// View-state reconcilers sitting between the `ngx-data` simulators and a presentation layer:
/// - market view: snapshot/patch folding and a volume-ranked watchlist
/// - trading desk: local order book, delayed fills and a marked-to-market position ledger
/// - news view: late-subscriber news/alert feeds and user price alerts
///
/// Each reconciler owns its simulator subscription for the lifetime of its mount.
pub mod shared;

// Re-export commonly used types for convenience
pub use shared::market_view::{MarketView, MarketViewState, WATCHLIST_SIZE};
pub use shared::news_view::{AlertCondition, AlertError, NewsView, NewsViewState, PriceAlert};
pub use shared::trading::{
    Ledger, Order, OrderKind, OrderRequest, OrderSide, OrderStatus, PortfolioSummary, Position,
    SeedPosition, TradeError, TradingConfig, TradingDesk,
};

pub use shared::format::{format_naira, format_percent, format_signed_naira, format_volume};
