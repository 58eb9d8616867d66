use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NativeError {
    #[error("failed to open library {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("library {path} is not loaded: {reason}")]
    NotLoaded { path: PathBuf, reason: String },

    #[error("symbol \"{symbol}\" not found in {library}")]
    SymbolNotFound { library: String, symbol: String },

    #[error("call to \"{symbol}\" with {count} arguments exceeds the limit of {max}")]
    ArityExceeded {
        symbol: String,
        count: usize,
        max: usize,
    },

    #[error("invalid module parameter blob: {0}")]
    InvalidParam(#[from] serde_json::Error),
}
