//! Audio sections: directional encoding and the early-reflection path.
//!
//! Each section owns a rolling four-channel mix buffer its divisions write
//! into. Per block it encodes the four channels into B-format components
//! (omni W, front-back X, left-right Y) from its azimuth and stereo-width
//! parameters, and derives the reverb send from delayed taps on the rolling
//! buffer pushed through a cascade of allpass diffusers.

use crate::diffuser::Diffuser;
use montre_core::{ParamSet, BLOCK, MIXLEN, NCHANN};
use std::f32::consts::TAU;
use std::sync::Arc;

/// Parameter indices into a section's [`ParamSet`].
pub mod param {
    /// Horizontal placement in the soundfield, in turns (-0.5..0.5).
    pub const AZIMUTH: usize = 0;
    /// Angular spread of the four mix channels (0..1).
    pub const STWIDTH: usize = 1;
    /// Dry signal level.
    pub const DIRECT: usize = 2;
    /// Early-reflection send level.
    pub const REFLECT: usize = 3;
    /// Late-reverb send level.
    pub const REVERB: usize = 4;
}

/// Relative delays for the diffusers (first four entries) and the early
/// reflection taps, as fractions of the section size.
const REFL: [f32; 16] = [
    0.041, 0.053, 0.069, 0.083, // diffusers
    0.150, 0.217, 0.263, 0.311, // taps, channel-interleaved
    0.367, 0.421, 0.473, 0.539, //
    0.601, 0.667, 0.731, 0.797, //
];

const NTAPS: usize = 12;
const BUFLEN: usize = BLOCK * MIXLEN;

/// One spatialized output group.
pub struct AudioSection {
    fsam: f32,
    base: Vec<f32>,
    offs0: usize,
    taps: [usize; NTAPS],
    dif: [Diffuser; 4],
    sw: f32,
    sx: f32,
    sy: f32,
    params: Arc<ParamSet<5>>,
}

impl AudioSection {
    pub fn new(fsam: f32) -> Self {
        let params = Arc::new(ParamSet::new([
            (0.0, -0.5, 0.5),  // AZIMUTH
            (0.8, 0.0, 1.0),   // STWIDTH
            (0.32, 0.0, 1.0),  // DIRECT
            (0.35, 0.0, 1.0),  // REFLECT
            (0.40, 0.0, 1.0),  // REVERB
        ]));
        let mut s = Self {
            fsam,
            base: vec![0.0; NCHANN * BUFLEN],
            offs0: 0,
            taps: [0; NTAPS],
            dif: [
                Diffuser::new(1, 0.5),
                Diffuser::new(1, 0.5),
                Diffuser::new(1, 0.5),
                Diffuser::new(1, 0.5),
            ],
            sw: 0.0,
            sx: 0.0,
            sy: 0.0,
            params,
        };
        s.set_size(0.075);
        s
    }

    /// Shared parameter cells, handed to the model at startup.
    pub fn params(&self) -> Arc<ParamSet<5>> {
        self.params.clone()
    }

    /// Re-derive diffuser lengths and tap delays from the section size in
    /// seconds. Tap delays are capped so they never reach into the block
    /// that is being recycled for the next write.
    pub fn set_size(&mut self, size: f32) {
        for (k, d) in self.dif.iter_mut().enumerate() {
            *d = Diffuser::new((REFL[k] * size * self.fsam) as usize, 0.5);
        }
        for (j, t) in self.taps.iter_mut().enumerate() {
            let del = (REFL[4 + j] * size * self.fsam) as usize;
            *t = del.min(BUFLEN - BLOCK);
        }
    }

    /// Add one division's block at the current write offset.
    pub fn mix_in(&mut self, mix: &[f32; NCHANN * BLOCK], gains: &[f32; BLOCK]) {
        for c in 0..NCHANN {
            let base = &mut self.base[c * BUFLEN + self.offs0..c * BUFLEN + self.offs0 + BLOCK];
            let chan = &mix[c * BLOCK..(c + 1) * BLOCK];
            for i in 0..BLOCK {
                base[i] += chan[i] * gains[i];
            }
        }
    }

    /// Encode the current block into the W/X/Y busses and the reverb send,
    /// then advance the rolling buffer.
    pub fn process(&mut self, vol: f32, w: &mut [f32], x: &mut [f32], y: &mut [f32], r: &mut [f32]) {
        // Smooth the controls at block rate so parameter jumps cannot click.
        self.sw += 0.2 * (vol * self.params.get(param::DIRECT) - self.sw);
        self.sx += 0.2 * (self.params.get(param::AZIMUTH) - self.sx);
        self.sy += 0.2 * (self.params.get(param::STWIDTH) - self.sy);
        let refl = vol * self.params.get(param::REFLECT);
        let revb = vol * self.params.get(param::REVERB);

        // Directional coefficients: the four mix channels fan out around the
        // section azimuth, spread by the stereo width.
        let mut cx = [0.0f32; NCHANN];
        let mut cy = [0.0f32; NCHANN];
        for (k, (cxk, cyk)) in cx.iter_mut().zip(cy.iter_mut()).enumerate() {
            let th = TAU * (self.sx + self.sy * (k as f32 - 1.5) / 6.0);
            *cxk = th.cos();
            *cyk = th.sin();
        }

        for i in 0..BLOCK {
            let mut d = 0.0f32;
            let mut dx = 0.0f32;
            let mut dy = 0.0f32;
            for c in 0..NCHANN {
                let s = self.base[c * BUFLEN + self.offs0 + i];
                d += s;
                dx += cx[c] * s;
                dy += cy[c] * s;
            }
            d *= 0.25;
            dx *= 0.25;
            dy *= 0.25;

            // Early pattern: delayed taps from the rolling buffer, diffused.
            let mut e = 0.0f32;
            for (j, &t) in self.taps.iter().enumerate() {
                let pos = (self.offs0 + i + BUFLEN - t) & (BUFLEN - 1);
                e += self.base[(j % NCHANN) * BUFLEN + pos];
            }
            e /= NTAPS as f32;
            let e = self
                .dif
                .iter_mut()
                .fold(e, |acc, dif| dif.process(acc));

            w[i] += self.sw * d;
            x[i] += self.sw * dx;
            y[i] += self.sw * dy;
            r[i] += refl * e + revb * d;
        }

        // Recycle the oldest block as the next write target.
        let next = (self.offs0 + BLOCK) & (BUFLEN - 1);
        for c in 0..NCHANN {
            self.base[c * BUFLEN + next..c * BUFLEN + next + BLOCK].fill(0.0);
        }
        self.offs0 = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_of(v: f32) -> ([f32; NCHANN * BLOCK], [f32; BLOCK]) {
        ([v; NCHANN * BLOCK], [1.0; BLOCK])
    }

    #[test]
    fn test_direct_path_appears_in_w() {
        let mut s = AudioSection::new(48_000.0);
        let (mix, gains) = block_of(1.0);
        let mut w = [0.0f32; BLOCK];
        let mut x = [0.0f32; BLOCK];
        let mut y = [0.0f32; BLOCK];
        let mut r = [0.0f32; BLOCK];
        // Let the gain smoother settle.
        for _ in 0..64 {
            s.mix_in(&mix, &gains);
            w.fill(0.0);
            s.process(1.0, &mut w, &mut x, &mut y, &mut r);
        }
        let direct = 0.32f32;
        assert!((w[BLOCK - 1] - direct).abs() < 0.01, "w={}", w[BLOCK - 1]);
    }

    #[test]
    fn test_centered_section_has_no_y() {
        // Azimuth 0, equal channels: the left-right components cancel.
        let mut s = AudioSection::new(48_000.0);
        let (mix, gains) = block_of(0.5);
        let mut w = [0.0f32; BLOCK];
        let mut x = [0.0f32; BLOCK];
        let mut y = [0.0f32; BLOCK];
        let mut r = [0.0f32; BLOCK];
        for _ in 0..32 {
            s.mix_in(&mix, &gains);
            y.fill(0.0);
            s.process(1.0, &mut w, &mut x, &mut y, &mut r);
        }
        assert!(y.iter().all(|v| v.abs() < 1e-4));
    }

    #[test]
    fn test_reverb_send_is_delayed() {
        // With the direct send muted, R carries only delayed material: an
        // impulse block must not appear in R immediately, but must arrive
        // within the rolling buffer's horizon.
        let mut s = AudioSection::new(48_000.0);
        s.params().set(param::REVERB, 0.0);
        let (mix, gains) = block_of(1.0);
        let mut w = [0.0f32; BLOCK];
        let mut x = [0.0f32; BLOCK];
        let mut y = [0.0f32; BLOCK];
        let mut r = [0.0f32; BLOCK];
        s.mix_in(&mix, &gains);
        s.process(1.0, &mut w, &mut x, &mut y, &mut r);
        let first: f32 = r.iter().map(|v| v.abs()).sum();
        assert!(first < 1e-3, "reflections arrived instantly: {first}");

        let mut arrived = false;
        for _ in 0..MIXLEN {
            r.fill(0.0);
            s.process(1.0, &mut w, &mut x, &mut y, &mut r);
            if r.iter().any(|v| v.abs() > 1e-4) {
                arrived = true;
                break;
            }
        }
        assert!(arrived, "reflections never arrived");
    }

    #[test]
    fn test_set_size_scales_diffusers() {
        let mut s = AudioSection::new(48_000.0);
        s.set_size(0.075);
        let small = s.dif[0].size();
        s.set_size(0.15);
        let ratio = s.dif[0].size() as f32 / small as f32;
        assert!((ratio - 2.0).abs() < 0.02, "ratio {ratio}");
    }
}
