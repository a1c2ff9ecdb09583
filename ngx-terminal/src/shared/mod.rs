/// Shared modules for the NGX terminal
pub mod format;
pub mod market_view;
pub mod news_view;
pub mod trading;
