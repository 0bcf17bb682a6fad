use thiserror::Error;

/// Failure a [`TileHandle`](crate::multiplexer::TileHandle) resolves with.
///
/// Cloneable because every caller sharing a coalesced request observes the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("tile channel is not open")]
    ChannelNotOpen,

    #[error("tile channel closed before a response arrived")]
    ChannelClosed,

    #[error("server reported failure for tile {key}")]
    Rejected { key: String },

    #[error("tile request {key} timed out")]
    TimedOut { key: String },

    #[error("tile request {key} was cancelled")]
    Cancelled { key: String },

    #[error("failed to encode tile request {key}: {message}")]
    Encode { key: String, message: String },
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid channel address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tile fetch from {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("malformed tile payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary tile body of {0} bytes is not a whole number of f64 bins")]
    BinaryLength(usize),

    #[error("unexpected tile payload shape: {0}")]
    UnexpectedPayload(String),

    #[error(transparent)]
    Request(#[from] RequestError),
}
