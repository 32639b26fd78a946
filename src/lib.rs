//! montre: a real-time additive pipe-organ synthesizer.
//!
//! Sound comes from per-pipe wavetable oscillators (one pipe per note per
//! rank), mixed through per-division swell/tremulant processing, spatialized
//! by audio sections into B-format, and finished by an eight-lane hall
//! reverberator. MIDI and control changes reach the audio thread only
//! through lock-free rings; rank wavetables are computed on a background
//! worker and swapped in between blocks.
//!
//! # Quick start
//!
//! ```no_run
//! use montre::{DivisionDef, Instrument, OrganBuilder, StopDef};
//!
//! let mut principal = StopDef::new("Principal 8", 36, 96);
//! principal.h_lev.set_point(0, 4, 0.0);
//! principal.h_lev.set_point(2, 4, -15.0);
//!
//! let instrument = Instrument::new(440.0, 5)
//!     .with_division(DivisionDef::new("Great", 0, 0).with_stop(principal));
//!
//! let mut organ = OrganBuilder::new(instrument).build().unwrap();
//! organ.start_output().unwrap();
//! organ.controller().stop_on(0, 0).unwrap();
//! // feed MIDI via organ.take_dispatcher() ...
//! ```
//!
//! # Crates
//!
//! - [`montre_core`]: rings, commands, keymap, atomic parameters
//! - [`montre_synth`]: wavetable builder, pipes, ranks, divisions
//! - [`montre_dsp`]: audio sections and the reverberator
//! - [`montre_midi`]: event normalization and routing

pub mod builder;
pub mod engine;
pub mod error;
pub mod model;

mod msg;
mod worker;

#[cfg(feature = "driver")]
mod driver;

pub use builder::{Controller, Organ, OrganBuilder};
pub use engine::Engine;
pub use error::{Error, Result};
pub use model::{DivisionDef, Instrument, ModelEvent, UiEvent};

pub use montre_core::{Command, EngineConfig, ParamSet, BLOCK};
pub use montre_midi::{cc, Dispatcher, MidiEvent, MidiMap};
pub use montre_synth::{Pan, StopDef, Temperament, EQUAL, TEMPERAMENTS};
