use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// All errors generated in `ngx-data`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum DataError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(SmolStr),

    #[error("simulated link failed to open: {0}")]
    LinkDown(String),

    #[error("failed to reconnect after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("simulator timers require a running tokio runtime")]
    NoRuntime,
}

impl DataError {
    /// Determine if an error ends the [`MarketSimulator`](crate::market::MarketSimulator)
    /// connection lifecycle for good, ie/ no further automatic retry will happen.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            DataError::ReconnectExhausted { .. } => true,
            DataError::NoRuntime => true,
            _ => false,
        }
    }
}
