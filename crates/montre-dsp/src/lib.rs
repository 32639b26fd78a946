//! Spatialization and reverberation for the montre organ engine.
//!
//! [`AudioSection`] turns each division group's four-channel mix into
//! B-format components plus a reverb send; [`Reverb`] grows the shared tail.

pub mod diffuser;
pub mod reverb;
pub mod section;

pub use diffuser::Diffuser;
pub use reverb::Reverb;
pub use section::{param, AudioSection};
