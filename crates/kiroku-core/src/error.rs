use kiroku_api::error::ApiError;
use kiroku_api::traits::Provider;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KirokuError {
    #[error("config error: {0}")]
    Config(String),

    #[error("cross-reference snapshot error: {0}")]
    Snapshot(String),

    #[error("tracker error: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a local series could not be mapped to a tracker entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no {provider} entry found for '{title}'")]
    NotFound { provider: Provider, title: String },

    #[error("'{title}' matches {} {provider} entries: {candidates:?}", candidates.len())]
    Ambiguous {
        provider: Provider,
        title: String,
        candidates: Vec<u64>,
    },
}
