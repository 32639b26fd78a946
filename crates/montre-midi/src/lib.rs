//! MIDI routing for the montre organ engine.
//!
//! The MIDI thread normalizes driver events ([`MidiEvent`]), consults the
//! keyboard map ([`MidiMap`]) and pushes condensed records into the engine's
//! rings ([`Dispatcher`]). Hardware input lives behind the `midi-io`
//! feature.

pub mod dispatch;
pub mod event;
pub mod map;

#[cfg(feature = "midi-io")]
pub mod io;

pub use dispatch::Dispatcher;
pub use event::{cc, MidiEvent};
pub use map::{KeyboardMap, MidiMap};

use thiserror::Error;

/// Error type for MIDI I/O.
#[derive(Error, Debug)]
pub enum Error {
    #[error("MIDI backend error: {0}")]
    Backend(String),

    #[error("No MIDI input port matching {0:?}")]
    PortNotFound(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
