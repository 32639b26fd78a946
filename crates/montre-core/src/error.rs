//! Error types for montre-core.

use thiserror::Error;

/// Error type for montre-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Queue capacity {0} is not a power of two")]
    QueueCapacity(usize),

    #[error("Note {0} outside playable range")]
    NoteRange(u8),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
