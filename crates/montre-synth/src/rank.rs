//! A rank: one pipe per note over a compass, with routing masks.

use crate::pipewave::{GenScratch, Pipewave};
use crate::repetition::parse_repetitions;
use crate::stop::{Pan, Rand, StopDef};
use crate::Result;
use montre_core::BLOCK;

/// A set of pipes sharing a voicing, one per MIDI note in `n0..=n1`.
///
/// The routing masks say which keyboards the rank speaks for: `cmask` is
/// what is currently applied to sounding notes, `nmask` what the next
/// keymap pass will apply. Only the owning division reconciles the two.
#[derive(Debug)]
pub struct Rankwave {
    n0: u8,
    n1: u8,
    sbit: u32,
    pipes: Vec<Pipewave>,
    active: Vec<u16>,
    rng: Rand,
    modified: bool,
    /// Routing currently applied to sounding notes.
    pub cmask: u8,
    /// Routing about to take effect (bit 7 follows the division mask).
    pub nmask: u8,
}

impl Rankwave {
    pub fn new(n0: u8, n1: u8) -> Self {
        let count = (n1 - n0) as usize + 1;
        Self {
            n0,
            n1,
            sbit: 1,
            pipes: (0..count).map(|_| Pipewave::default()).collect(),
            active: Vec::with_capacity(count),
            rng: Rand::new(0x9e37_79b9 ^ ((n0 as u32) << 8 | n1 as u32)),
            modified: false,
            cmask: 0,
            nmask: 0,
        }
    }

    #[inline]
    pub fn n0(&self) -> u8 {
        self.n0
    }

    #[inline]
    pub fn n1(&self) -> u8 {
        self.n1
    }

    /// Waves computed since the last save/load?
    #[inline]
    pub fn modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn set_modified(&mut self, m: bool) {
        self.modified = m;
    }

    pub(crate) fn pipes(&self) -> &[Pipewave] {
        &self.pipes
    }

    /// Iterate each pipe's wavetable samples.
    pub fn pipe_samples(&self) -> impl Iterator<Item = &[f32]> {
        self.pipes.iter().map(|p| p.samples())
    }

    pub(crate) fn pipes_mut(&mut self) -> &mut [Pipewave] {
        &mut self.pipes
    }

    /// Key a note down. Startup is deferred by the rank's delay: the pipe
    /// only speaks once its delay bit has shifted down to bit 0.
    pub fn note_on(&mut self, n: u8) {
        if n < self.n0 || n > self.n1 {
            return;
        }
        let i = (n - self.n0) as usize;
        let p = &mut self.pipes[i];
        p.sbit = self.sbit;
        if p.is_idle() {
            p.sdel |= self.sbit;
            self.active.push(i as u16);
        }
    }

    /// Key a note up. A startup still in flight is cancelled; a sounding
    /// pipe goes to release on its next block.
    pub fn note_off(&mut self, n: u8) {
        if n < self.n0 || n > self.n1 {
            return;
        }
        let p = &mut self.pipes[(n - self.n0) as usize];
        p.sdel >>= 4;
        p.sbit = 0;
    }

    /// Release every sounding pipe.
    pub fn all_off(&mut self) {
        for &i in &self.active {
            self.pipes[i as usize].sbit = 0;
        }
    }

    /// Render all active pipes into the division mix buffer, advancing the
    /// startup delay line once when `shift` is set. Pipes that fall idle
    /// leave the active list.
    pub fn play(&mut self, shift: bool, mix: &mut [f32]) {
        let pipes = &mut self.pipes;
        let rng = &mut self.rng;
        self.active.retain(|&i| {
            let p = &mut pipes[i as usize];
            p.play(mix, rng);
            if shift {
                p.sdel = (p.sdel >> 1) | p.sbit;
            }
            p.is_active()
        });
    }

    /// Number of pipes currently in the active list.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Check the active-list invariant: a pipe is listed exactly while it
    /// has pending startup, play or release state.
    pub fn check_active_invariant(&self) -> bool {
        self.pipes.iter().enumerate().all(|(i, p)| {
            let listed = self.active.contains(&(i as u16));
            listed == p.is_active()
        })
    }

    /// Assign the startup delay (blocks) and each pipe's slot in the
    /// division mix buffer. Pan staggers adjacent pipes over channel pairs
    /// (or all four for a wrapped chest) so neighbouring notes beat against
    /// each other from different directions.
    pub fn set_param(&mut self, del: u32, pan: Pan) {
        self.sbit = 1 << del.min(31);
        let (a, b) = match pan {
            Pan::Left => (2, 0),
            Pan::Center => (2, 1),
            Pan::Right => (2, 2),
            Pan::Wrap => (4, 0),
        };
        for (i, p) in self.pipes.iter_mut().enumerate() {
            let n = self.n0 as usize + i;
            p.out = ((n % a) + b) * BLOCK;
        }
    }

    /// Build every pipe's wavetable.
    ///
    /// `fbase` is the tuning frequency of A, `scale` the temperament ratios
    /// relative to the keynote. The stop's rational pitch multiplier (and
    /// any repetition points in its comment field) select the sounding
    /// octave.
    pub fn gen_waves(
        &mut self,
        d: &StopDef,
        fsamp: f32,
        fbase: f32,
        scale: &[f32; 12],
    ) -> Result<()> {
        let points = parse_repetitions(&d.comments)?;
        let mut next = points.iter().peekable();

        let mut fbase_adj = fbase * d.fn_num as f32 / (d.fd_den as f32 * scale[9]);
        let mut scratch = GenScratch::default();
        let pipes = &mut self.pipes;
        let rng = &mut self.rng;
        for i in self.n0..=self.n1 {
            if let Some(p) = next.peek().map(|p| **p) {
                if p.note == i {
                    // A pitch of num/den feet corresponds to a multiplier of
                    // 8*den/num relative to unison pitch.
                    fbase_adj = fbase * (8 * p.den) as f32 / (p.num as f32 * scale[9]);
                    next.next();
                }
            }
            let fpipe =
                fbase_adj * scale[(i % 12) as usize] * 2f32.powi(i as i32 / 12 - 5);
            pipes[(i - self.n0) as usize].gen_wave(
                d,
                (i - self.n0) as i32,
                fsamp,
                fpipe,
                &mut scratch,
                rng,
            );
        }
        self.modified = true;
        Ok(())
    }
}
