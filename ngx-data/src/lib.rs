//! # NGX-Data
//! In-process simulators for a Nigerian Exchange (NGX) market terminal.
//!
//! - [`MarketSimulator`](market::MarketSimulator): random-walk quotes for the NGX catalog,
//!   published as price, volume and full-book snapshot events on tokio timers.
//! - [`NewsSimulator`](news::NewsSimulator): templated headlines and alerts on independent
//!   timers, kept in bounded newest-first feeds.
//! - [`EventBus`](bus::EventBus): typed synchronous publish/subscribe with per-handler fault
//!   isolation, used by both simulators.
//!
//! Timers are spawned on the ambient tokio runtime, so `connect` and `start` must be called from
//! within one.
//!
//! ## Example
//! ```rust,no_run
//! use ngx_data::{
//!     bus::handler,
//!     config::MarketSimConfig,
//!     market::{MarketEvent, MarketEventKind, MarketSimulator},
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let market = MarketSimulator::new(MarketSimConfig::default());
//!
//!     market.subscribe(
//!         MarketEventKind::PriceUpdate,
//!         handler(|event: &MarketEvent| {
//!             if let MarketEvent::PriceUpdate { symbol, quote, .. } = event {
//!                 println!("{symbol}: {:.2}", quote.price);
//!             }
//!             Ok(())
//!         }),
//!     );
//!
//!     market.connect().unwrap();
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     market.disconnect();
//! }
//! ```

/// Typed publish/subscribe [`EventBus`](bus::EventBus).
pub mod bus;

/// Simulator configuration.
pub mod config;

/// All [`Error`](std::error::Error)s generated in `ngx-data`.
pub mod error;

/// Monotonic, time derived ids.
pub mod id;

/// NGX [`InstrumentCatalog`](instrument::InstrumentCatalog).
pub mod instrument;

/// Simulated market data service.
pub mod market;

/// Simulated news and alert service.
pub mod news;

/// [`Quote`](quote::Quote) and the simulator-owned [`QuoteBook`](quote::QuoteBook).
pub mod quote;
