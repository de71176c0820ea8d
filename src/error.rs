use thiserror::Error;

/// Failure of a whole source during one fetch. Never fatal to a refresh.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("invalid feed: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid source URL '{0}'")]
    InvalidUrl(String),

    #[error("fetch cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("refresh cancelled")]
    Cancelled,
}

/// Backend failure of an [`AtomicStore`](crate::rate_limiter::AtomicStore).
#[derive(Debug, Error)]
#[error("rate limit store unavailable: {0}")]
pub struct StoreError(pub String);
