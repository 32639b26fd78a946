//! Additive wavetable synthesis for the montre organ engine.
//!
//! The chain from a stop definition to sound:
//!
//! - [`StopDef`] holds the voicing: per-note and per-harmonic
//!   [`curve`] parameters, pan, pitch multiplier.
//! - [`Pipewave`] turns one note of that description into an attack-plus-loop
//!   wavetable and plays it back with interpolation, instability and an
//!   exponential release.
//! - [`Rankwave`] spans a compass of pipes and tracks which are sounding.
//! - [`Division`] aggregates ranks under one swell box and tremulant.
//!
//! Ranks cache their wavetables in `.ae1` files ([`wavefile`]); tunings live
//! in [`scales`].

pub mod curve;
pub mod division;
pub mod error;
pub mod pipewave;
pub mod rank;
pub mod repetition;
pub mod scales;
pub mod stop;
pub mod wavefile;

pub use curve::{HarmCurve, NoteCurve, N_HARM, N_NOTE};
pub use division::Division;
pub use error::{Error, Result};
pub use pipewave::Pipewave;
pub use rank::Rankwave;
pub use repetition::{parse_repetitions, RepetitionPoint};
pub use scales::{Temperament, EQUAL, TEMPERAMENTS};
pub use stop::{Pan, Rand, StopDef};
