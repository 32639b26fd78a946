//! Lock-free parameter cells shared between control threads and the audio
//! thread.

use atomic_float::AtomicF32;
use std::sync::atomic::Ordering;

/// Cache-line aligned bounded atomic parameter.
///
/// Control threads store, the audio thread loads once per block. Stores clamp
/// to the cell's range so a stale UI value can never drive the engine outside
/// its envelope.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicParam {
    value: AtomicF32,
    min: f32,
    max: f32,
}

impl AtomicParam {
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        Self {
            value: AtomicF32::new(value.clamp(min, max)),
            min,
            max,
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value.clamp(self.min, self.max), Ordering::Release);
    }

    #[inline]
    pub fn min(&self) -> f32 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> f32 {
        self.max
    }
}

/// A fixed group of bounded parameters, indexed by a unit enum cast to usize.
#[derive(Debug)]
pub struct ParamSet<const N: usize> {
    params: [AtomicParam; N],
}

impl<const N: usize> ParamSet<N> {
    /// Build from `(value, min, max)` triples.
    pub fn new(init: [(f32, f32, f32); N]) -> Self {
        Self {
            params: init.map(|(v, lo, hi)| AtomicParam::new(v, lo, hi)),
        }
    }

    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        self.params[i].get()
    }

    #[inline]
    pub fn set(&self, i: usize, v: f32) {
        self.params[i].set(v);
    }

    #[inline]
    pub fn param(&self, i: usize) -> &AtomicParam {
        &self.params[i]
    }
}
