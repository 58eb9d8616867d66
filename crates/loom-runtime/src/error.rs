use std::path::PathBuf;

use loom_core::NativeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("no build of {name} for this host at {}", path.display())]
    BuildNotFound { name: String, path: PathBuf },

    #[error("{name}: {source}")]
    Native {
        name: String,
        #[source]
        source: NativeError,
    },

    #[error("{name}: initializer returned status {status}")]
    InitFailed { name: String, status: usize },

    #[error("{name}: initializer rejected its parameters: {reason}")]
    InitRejected { name: String, reason: String },

    #[error("{name}: invalid listen address: {reason}")]
    ListenAddr { name: String, reason: String },

    #[error("{name}: missing entry point \"{symbol}\"")]
    MissingEntryPoint { name: String, symbol: String },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("module {0} is declared more than once")]
    DuplicateModule(String),

    #[error("{name}: service loop already running")]
    LoopRunning { name: String },

    #[error("{name} failed to load earlier: {reason}")]
    Failed { name: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LoadError {
    pub(crate) fn native(name: &str, source: NativeError) -> Self {
        LoadError::Native {
            name: name.to_string(),
            source,
        }
    }
}
