use streaming::StreamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("expected {expected} bins for resolution {resolution}, got {actual}")]
    BinCount {
        resolution: u32,
        expected: usize,
        actual: usize,
    },

    #[error("tile payload is not {expected}")]
    UnexpectedData { expected: &'static str },

    #[error(transparent)]
    Stream(#[from] StreamError),
}
