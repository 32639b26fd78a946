//! Messages between the model, worker and audio threads.
//!
//! Rank wavetables travel as owning boxes: the worker builds them, the model
//! forwards them, the audio thread installs them between blocks and sends
//! any replaced rank back to the worker for disposal. Nothing is ever freed
//! on the audio thread.

use montre_synth::{Pan, Rankwave, StopDef};
use std::path::PathBuf;

/// Model → audio thread, polled between blocks.
pub(crate) enum AudioMsg {
    NewDivision {
        asect: usize,
        dmask: u8,
        swell: f32,
        tfreq: f32,
        tmodd: f32,
    },
    SetRank {
        divis: usize,
        rank: usize,
        wave: Box<Rankwave>,
        pan: Pan,
        del_ms: i32,
    },
    /// Constant linear gain for one division.
    DivisionVolume { divis: usize, gain: f32 },
    Sync,
}

/// Audio thread → model notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineReply {
    RankInstalled { divis: usize, rank: usize },
    Sync,
}

/// Jobs for the background worker.
pub(crate) enum WorkerJob {
    Build(BuildJob),
    /// A rank retired by the audio thread; dropped here.
    Dispose(Box<Rankwave>),
    Exit,
}

/// One rank build: probe the wavetable cache, else compute and refill it.
pub(crate) struct BuildJob {
    pub divis: usize,
    pub rank: usize,
    pub stop: StopDef,
    pub fsamp: f32,
    pub fbase: f32,
    pub scale: [f32; 12],
    pub cache_dir: Option<PathBuf>,
}
