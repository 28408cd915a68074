//! Codec-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
