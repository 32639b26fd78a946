//! A division: ranks sharing one audio path, swell and tremulant.

use crate::rank::Rankwave;
use crate::stop::Pan;
use montre_core::{BLOCK, FOLLOW_MASK, NCHANN, NNOTES, NOTE_MIN, NRANKS};

const MASK7: u8 = 0x7f;

/// Aggregates up to [`NRANKS`] ranks into one four-channel mix, applying the
/// division's swell gain and tremulant before the audio section picks the
/// block up.
pub struct Division {
    asect: usize,
    ranks: Vec<Option<Box<Rankwave>>>,
    nrank: usize,
    dmask: u8,
    trem: u8,
    fsam: f32,
    swel: f32,
    gain: f32,
    paramgain: f32,
    w: f32,
    c: f32,
    s: f32,
    m: f32,
    buff: [f32; NCHANN * BLOCK],
    gains: [f32; BLOCK],
}

impl Division {
    pub fn new(asect: usize, fsam: f32) -> Self {
        Self {
            asect,
            ranks: (0..NRANKS).map(|_| None).collect(),
            nrank: 0,
            dmask: 0,
            trem: 0,
            fsam,
            swel: 1.0,
            gain: 0.1,
            paramgain: 1.0,
            w: 0.0,
            c: 1.0,
            s: 0.0,
            m: 0.0,
            buff: [0.0; NCHANN * BLOCK],
            gains: [0.0; BLOCK],
        }
    }

    /// Audio section this division feeds.
    #[inline]
    pub fn asect(&self) -> usize {
        self.asect
    }

    /// Install a rank, returning the replaced one (to be disposed of off
    /// the audio thread). The newcomer inherits the old rank's applied
    /// routing as its pending mask, so the next keymap pass reconciles
    /// sounding notes instead of cutting them.
    pub fn set_rank(
        &mut self,
        ind: usize,
        mut wave: Box<Rankwave>,
        pan: Pan,
        del_ms: i32,
    ) -> Option<Box<Rankwave>> {
        if ind >= NRANKS {
            return Some(wave);
        }
        let old = self.ranks[ind].take();
        wave.nmask = old.as_ref().map_or(0, |c| c.cmask);
        wave.cmask = 0;
        let del = (1e-3 * del_ms as f32 * self.fsam / BLOCK as f32) as u32;
        wave.set_param(del.min(31), pan);
        self.ranks[ind] = Some(wave);
        if self.nrank < ind + 1 {
            self.nrank = ind + 1;
        }
        old
    }

    pub fn set_swell(&mut self, stat: f32) {
        self.swel = 0.2 + 0.8 * stat * stat;
    }

    pub fn set_trem_freq(&mut self, freq: f32) {
        self.w = std::f32::consts::TAU * BLOCK as f32 * freq / self.fsam;
    }

    pub fn set_trem_mod(&mut self, modd: f32) {
        self.m = modd;
    }

    pub fn set_param_gain(&mut self, gain: f32) {
        self.paramgain = gain.abs();
    }

    #[inline]
    pub fn param_gain(&self) -> f32 {
        self.paramgain
    }

    pub fn trem_on(&mut self) {
        self.trem = 1;
    }

    /// Stop the tremulant gracefully: the phasor keeps running until it
    /// passes close to zero phase, then snaps off.
    pub fn trem_off(&mut self) {
        self.trem = 2;
    }

    #[inline]
    pub fn tremulant_active(&self) -> bool {
        self.trem == 1
    }

    /// Set bits in the division's default mask and in every rank that
    /// follows it.
    pub fn set_div_mask(&mut self, bits: u8) {
        let bits = bits & MASK7;
        self.dmask |= bits;
        for w in self.ranks[..self.nrank].iter_mut().flatten() {
            if w.nmask & FOLLOW_MASK != 0 {
                w.nmask |= bits;
            }
        }
    }

    /// Clear bits in the division's default mask and in every rank that
    /// follows it.
    pub fn clr_div_mask(&mut self, bits: u8) {
        let bits = bits & MASK7;
        self.dmask &= !bits;
        for w in self.ranks[..self.nrank].iter_mut().flatten() {
            if w.nmask & FOLLOW_MASK != 0 {
                w.nmask &= !bits;
            }
        }
    }

    /// Set bits in one rank's pending mask. The follow sentinel expands to
    /// the division's current default mask.
    pub fn set_rank_mask(&mut self, ind: usize, bits: u8) {
        let bits = if bits == FOLLOW_MASK {
            bits | self.dmask
        } else {
            bits
        };
        if let Some(Some(w)) = self.ranks.get_mut(ind) {
            w.nmask |= bits;
        }
    }

    /// Clear bits in one rank's pending mask.
    pub fn clr_rank_mask(&mut self, ind: usize, bits: u8) {
        let bits = if bits == FOLLOW_MASK {
            bits | self.dmask
        } else {
            bits
        };
        if let Some(Some(w)) = self.ranks.get_mut(ind) {
            w.nmask &= !bits;
        }
    }

    /// Per-note update: the keymap byte for `note` (keymap offset) just
    /// changed to `mask`. Ranks react against their applied mask only; the
    /// pending mask waits for the keymap pass.
    pub fn update_note(&mut self, note: usize, mask: u8) {
        for w in self.ranks[..self.nrank].iter_mut().flatten() {
            if w.cmask & MASK7 != 0 {
                if mask & w.cmask != 0 {
                    w.note_on(note as u8 + NOTE_MIN);
                } else {
                    w.note_off(note as u8 + NOTE_MIN);
                }
            }
        }
    }

    /// Keymap pass: reconcile every rank whose pending mask differs from
    /// its applied mask, then commit `cmask = nmask`.
    pub fn update_keys(&mut self, keys: &[u8; NNOTES]) {
        for w in self.ranks[..self.nrank].iter_mut().flatten() {
            if (w.cmask ^ w.nmask) & MASK7 != 0 {
                let m = w.nmask & MASK7;
                if m != 0 {
                    let n0 = w.n0().max(NOTE_MIN);
                    let n1 = w.n1().min(montre_core::NOTE_MAX);
                    for n in n0..=n1 {
                        let k = keys[(n - NOTE_MIN) as usize];
                        if k & m != 0 {
                            w.note_on(n);
                        } else {
                            w.note_off(n);
                        }
                    }
                } else {
                    w.all_off();
                }
            }
            w.cmask = w.nmask;
        }
    }

    /// Render one block: all ranks into the mix buffer, then the swell and
    /// tremulant gain ramp. The new gain is clamped within 5 % of the last
    /// block's trailing gain, which caps zipper noise without a smoother.
    pub fn process(&mut self) {
        self.buff.fill(0.0);
        for w in self.ranks[..self.nrank].iter_mut().flatten() {
            w.play(true, &mut self.buff);
        }

        let mut g = self.swel;
        if self.trem != 0 {
            self.s += self.w * self.c;
            self.c -= self.w * self.s;
            let t = (self.c * self.c + self.s * self.s).sqrt();
            self.c /= t;
            self.s /= t;
            if self.trem == 2 && self.s.abs() < 0.05 {
                self.trem = 0;
                self.c = 1.0;
                self.s = 0.0;
            }
            g *= 1.0 + self.m * self.s;
        }

        g = g.clamp(0.95 * self.gain, 1.05 * self.gain);
        let d = (g - self.gain) / BLOCK as f32;
        let mut g = self.gain;
        for gi in &mut self.gains {
            g += d;
            *gi = g * self.paramgain;
        }
        self.gain = g;
    }

    /// Mix buffer filled by [`process`](Self::process).
    #[inline]
    pub fn mix(&self) -> &[f32; NCHANN * BLOCK] {
        &self.buff
    }

    /// Per-sample gains for this block, including the division volume.
    #[inline]
    pub fn gains(&self) -> &[f32; BLOCK] {
        &self.gains
    }

    /// Tremulant phasor state, for tests.
    #[inline]
    pub fn trem_phase(&self) -> (f32, f32) {
        (self.c, self.s)
    }

    #[inline]
    pub fn rank(&self, ind: usize) -> Option<&Rankwave> {
        self.ranks.get(ind)?.as_deref()
    }

    #[inline]
    pub fn rank_mut(&mut self, ind: usize) -> Option<&mut Rankwave> {
        self.ranks.get_mut(ind)?.as_deref_mut()
    }
}
