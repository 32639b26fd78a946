//! Error types for montre-synth.

use thiserror::Error;

/// Error type for rank construction and the wavetable cache.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a wavetable file (bad magic)")]
    Magic,

    #[error("Unsupported wavetable version {0}")]
    Version(u8),

    #[error("Note range mismatch: file has {file_n0}..={file_n1}, rank is {rank_n0}..={rank_n1}")]
    NoteRange {
        file_n0: u8,
        file_n1: u8,
        rank_n0: u8,
        rank_n1: u8,
    },

    #[error("Sample rate mismatch: file has {0} Hz")]
    SampleRate(f32),

    #[error("Tuning mismatch: file has {0} Hz")]
    Tuning(f32),

    #[error("Temperament mismatch at degree {0}")]
    Temperament(usize),

    #[error("Malformed repetition point {0:?}")]
    Repetition(String),

    #[error("Pipe record too large: {0} samples")]
    PipeSize(u32),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
