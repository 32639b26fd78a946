//! Core building blocks for the montre organ engine.
//!
//! This crate carries everything the real-time audio thread shares with the
//! control threads: the lock-free SPSC rings, the command-word encoding, the
//! keymap, and the atomic parameter cells. Nothing here allocates or blocks
//! after construction.

pub mod command;
pub mod config;
pub mod error;
pub mod keymap;
pub mod lockfree;
pub mod ring;

pub use command::{Command, DivParamId};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use keymap::{Hold, Keymap};
pub use lockfree::{AtomicParam, ParamSet};
pub use ring::{ring, Consumer, Producer};

/// Samples per audio block. Every buffer in the engine is a multiple of this.
pub const BLOCK: usize = 64;

/// Number of blocks of history kept in an audio section's mix buffer.
pub const MIXLEN: usize = 64;

/// Channels in a division mix buffer.
pub const NCHANN: usize = 4;

/// Maximum ranks per division.
pub const NRANKS: usize = 32;

/// Maximum divisions per instrument.
pub const NDIVIS: usize = 8;

/// Maximum audio sections.
pub const NASECT: usize = 4;

/// Lowest playable MIDI note.
pub const NOTE_MIN: u8 = 36;

/// Highest playable MIDI note.
pub const NOTE_MAX: u8 = 96;

/// Number of keymap slots.
pub const NNOTES: usize = (NOTE_MAX - NOTE_MIN + 1) as usize;

/// Keyboard bits in a keymap byte.
pub const KEYS_MASK: u8 = 0x3f;

/// Hold (sustain) bit in a keymap byte.
pub const HOLD_MASK: u8 = 0x40;

/// "Changed since last pass" flag in a keymap byte.
pub const CHANGED_MASK: u8 = 0x80;

/// "Follow division mask" sentinel bit in rank and MIDI-map masks.
pub const FOLLOW_MASK: u8 = 0x80;
