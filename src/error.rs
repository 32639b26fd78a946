//! Error types for the montre facade.

use thiserror::Error;

/// Error type for engine assembly and control.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] montre_core::Error),

    #[error(transparent)]
    Synth(#[from] montre_synth::Error),

    #[error(transparent)]
    Midi(#[from] montre_midi::Error),

    #[error("Instrument definition: {0}")]
    Instrument(String),

    #[error("Engine is already running")]
    AlreadyRunning,

    #[error("Control thread is gone")]
    ControlGone,

    #[cfg(feature = "driver")]
    #[error("No audio output device")]
    NoDevice,

    #[cfg(feature = "driver")]
    #[error("Audio device: {0}")]
    Device(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
