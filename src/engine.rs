//! The audio-thread driver.
//!
//! [`Engine::render`] is called from the host driver's callback and must
//! never allocate, block or log. Per 64-frame block it drains the command
//! and note rings, propagates key state into the divisions, renders every
//! division into its audio section, folds the sections and the reverb into
//! the B-format busses and decodes those to the output channels.

use crate::msg::{AudioMsg, EngineReply, WorkerJob};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use montre_core::{
    Command, Consumer, Hold, Keymap, ParamSet, BLOCK, HOLD_MASK, NDIVIS, NRANKS,
};
use montre_dsp::{AudioSection, Reverb};
use montre_synth::Division;
use std::sync::Arc;

/// Instrument parameter indices.
pub mod instr {
    pub const VOLUME: usize = 0;
    pub const REVSIZE: usize = 1;
    pub const REVTIME: usize = 2;
    pub const STPOSIT: usize = 3;
}

/// Shared instrument parameters with their ranges.
pub(crate) fn instr_params() -> Arc<ParamSet<4>> {
    Arc::new(ParamSet::new([
        (0.32, 0.0, 1.0),    // VOLUME
        (0.075, 0.025, 0.15), // REVSIZE
        (4.0, 2.0, 7.0),     // REVTIME
        (0.5, -1.0, 1.0),    // STPOSIT
    ]))
}

pub(crate) struct EngineWiring {
    pub notes: Consumer<u32>,
    pub commands: Consumer<u32>,
    pub from_model: Receiver<AudioMsg>,
    pub to_model: Sender<EngineReply>,
    pub worker: Sender<WorkerJob>,
    pub params: Arc<ParamSet<4>>,
}

/// The real-time synthesis engine. Owned by the audio callback.
pub struct Engine {
    fsamp: f32,
    nplay: usize,
    bform: bool,
    notes: Consumer<u32>,
    commands: Consumer<u32>,
    from_model: Receiver<AudioMsg>,
    to_model: Sender<EngineReply>,
    worker: Sender<WorkerJob>,
    pending_retire: Vec<Box<montre_synth::Rankwave>>,
    keymap: Keymap,
    hold: Hold,
    divisions: Vec<Division>,
    sections: Vec<AudioSection>,
    reverb: Reverb,
    params: Arc<ParamSet<4>>,
    revsize: f32,
    revtime: f32,
}

impl Engine {
    pub(crate) fn new(
        fsamp: f32,
        nplay: usize,
        bform: bool,
        nasect: usize,
        wiring: EngineWiring,
    ) -> Self {
        let mut reverb = Reverb::new(fsamp);
        let revtime = wiring.params.get(instr::REVTIME);
        let revsize = wiring.params.get(instr::REVSIZE);
        reverb.set_delay(revsize);
        reverb.set_t60mf(revtime);
        reverb.set_t60lo(revtime * 1.5, 250.0);
        reverb.set_t60hi(revtime * 0.5, 3e3);

        let mut sections: Vec<AudioSection> =
            (0..nasect).map(|_| AudioSection::new(fsamp)).collect();
        for s in &mut sections {
            s.set_size(revsize);
        }

        Self {
            fsamp,
            nplay,
            bform: bform || nplay == 4,
            notes: wiring.notes,
            commands: wiring.commands,
            from_model: wiring.from_model,
            to_model: wiring.to_model,
            worker: wiring.worker,
            pending_retire: Vec::with_capacity(NDIVIS * NRANKS),
            keymap: Keymap::new(),
            hold: Hold::default(),
            divisions: Vec::with_capacity(NDIVIS),
            sections,
            reverb,
            params: wiring.params,
            revsize,
            revtime,
        }
    }

    /// Output channel count.
    #[inline]
    pub fn channels(&self) -> usize {
        self.nplay
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.fsamp
    }

    /// Parameter cells for audio section `i`.
    pub fn section_params(&self, i: usize) -> Option<Arc<ParamSet<5>>> {
        self.sections.get(i).map(|s| s.params())
    }

    /// Render interleaved frames into `out` (`out.len()` = frames x
    /// channels). Whole blocks only; a trailing partial block is zeroed.
    pub fn render(&mut self, out: &mut [f32]) {
        let frames = out.len() / self.nplay;
        self.check_drift();

        let vol = self.params.get(instr::VOLUME);
        let stpos = self.params.get(instr::STPOSIT);

        let mut w = [0.0f32; BLOCK];
        let mut x = [0.0f32; BLOCK];
        let mut y = [0.0f32; BLOCK];
        let mut z = [0.0f32; BLOCK];
        let mut r = [0.0f32; BLOCK];

        let mut done = 0;
        while done + BLOCK <= frames {
            self.proc_mesg();
            drain_queue(
                &mut self.commands,
                &mut self.keymap,
                &mut self.hold,
                &mut self.divisions,
            );
            drain_queue(
                &mut self.notes,
                &mut self.keymap,
                &mut self.hold,
                &mut self.divisions,
            );
            self.proc_keys();

            w.fill(0.0);
            x.fill(0.0);
            y.fill(0.0);
            z.fill(0.0);
            r.fill(0.0);

            for d in &mut self.divisions {
                d.process();
                let sect = &mut self.sections[d.asect()];
                sect.mix_in(d.mix(), d.gains());
            }
            for s in &mut self.sections {
                s.process(vol, &mut w, &mut x, &mut y, &mut r);
            }
            self.reverb
                .process(BLOCK, vol, &r, &mut w, &mut x, &mut y, &mut z);

            let o = &mut out[done * self.nplay..(done + BLOCK) * self.nplay];
            if self.bform {
                for i in 0..BLOCK {
                    o[4 * i] = w[i];
                    o[4 * i + 1] = 1.41 * x[i];
                    o[4 * i + 2] = 1.41 * y[i];
                    o[4 * i + 3] = 1.41 * z[i];
                }
            } else if self.nplay == 2 {
                for i in 0..BLOCK {
                    let a = w[i] + stpos * x[i];
                    o[2 * i] = a + y[i];
                    o[2 * i + 1] = a - y[i];
                }
            } else {
                for (i, o) in o.iter_mut().enumerate() {
                    *o = w[i] + stpos * x[i] + y[i];
                }
            }
            done += BLOCK;
        }
        out[done * self.nplay..].fill(0.0);
    }

    /// Reinitialize the reverberation network when its parameters have
    /// drifted past audibility thresholds.
    fn check_drift(&mut self) {
        let revsize = self.params.get(instr::REVSIZE);
        if (revsize - self.revsize).abs() > 0.001 {
            self.revsize = revsize;
            self.reverb.set_delay(revsize);
            for s in &mut self.sections {
                s.set_size(revsize);
            }
        }
        let revtime = self.params.get(instr::REVTIME);
        if (revtime - self.revtime).abs() > 0.1 {
            self.revtime = revtime;
            self.reverb.set_t60mf(revtime);
            self.reverb.set_t60lo(revtime * 1.5, 250.0);
            self.reverb.set_t60hi(revtime * 0.5, 3e3);
        }
    }

    /// Poll the model's message channel: division creation and rank
    /// installs happen here, between blocks. Replaced ranks are forwarded
    /// to the worker; if its channel is momentarily full they wait in a
    /// preallocated list rather than being freed here.
    fn proc_mesg(&mut self) {
        while let Some(wave) = self.pending_retire.pop() {
            if !self.try_dispose(wave) {
                break;
            }
        }

        while let Ok(msg) = self.from_model.try_recv() {
            match msg {
                AudioMsg::NewDivision {
                    asect,
                    dmask,
                    swell,
                    tfreq,
                    tmodd,
                } => {
                    if self.divisions.len() >= NDIVIS || asect >= self.sections.len() {
                        continue;
                    }
                    let mut d = Division::new(asect, self.fsamp);
                    d.set_div_mask(dmask);
                    d.set_swell(swell);
                    d.set_trem_freq(tfreq);
                    d.set_trem_mod(tmodd);
                    self.divisions.push(d);
                }
                AudioMsg::SetRank {
                    divis,
                    rank,
                    wave,
                    pan,
                    del_ms,
                } => {
                    if divis >= self.divisions.len() || rank >= NRANKS {
                        self.retire(wave);
                        continue;
                    }
                    if let Some(old) = self.divisions[divis].set_rank(rank, wave, pan, del_ms) {
                        self.retire(old);
                    }
                    let _ = self
                        .to_model
                        .try_send(EngineReply::RankInstalled { divis, rank });
                }
                AudioMsg::DivisionVolume { divis, gain } => {
                    if let Some(d) = self.divisions.get_mut(divis) {
                        d.set_param_gain(gain);
                    }
                }
                AudioMsg::Sync => {
                    let _ = self.to_model.try_send(EngineReply::Sync);
                }
            }
        }
    }

    fn retire(&mut self, wave: Box<montre_synth::Rankwave>) {
        self.try_dispose(wave);
    }

    /// Hand a retired rank to the worker without ever dropping it here.
    /// Returns false if the channel would not take it and the rank went to
    /// the preallocated holding list instead.
    fn try_dispose(&mut self, wave: Box<montre_synth::Rankwave>) -> bool {
        match self.worker.try_send(WorkerJob::Dispose(wave)) {
            Ok(()) => true,
            Err(TrySendError::Full(WorkerJob::Dispose(w)))
            | Err(TrySendError::Disconnected(WorkerJob::Dispose(w))) => {
                self.pending_retire.push(w);
                false
            }
            Err(_) => false,
        }
    }

    /// Propagate key state: per-note deltas first, then the mask
    /// reconciliation pass, so both converge before rendering.
    fn proc_keys(&mut self) {
        let divisions = &mut self.divisions;
        self.keymap.drain_changed(|n, state| {
            for d in divisions.iter_mut() {
                d.update_note(n, state & 0x7f);
            }
        });
        let keys = self.keymap.bytes();
        for d in divisions.iter_mut() {
            d.update_keys(keys);
        }
    }
}

/// Drain one command ring. A two-word command whose float payload has not
/// been published yet stays queued for the next block.
fn drain_queue(
    q: &mut Consumer<u32>,
    keymap: &mut Keymap,
    hold: &mut Hold,
    divisions: &mut [Division],
) {
    loop {
        let avail = q.read_avail();
        if avail == 0 {
            return;
        }
        let word = q.read(0);
        let extra_n = Command::extra_words(word);
        if avail < 1 + extra_n {
            return;
        }
        let extra = (extra_n == 1).then(|| q.read(1));
        q.read_commit(1 + extra_n);
        let Some(cmd) = Command::decode(word, extra) else {
            continue;
        };
        apply(cmd, keymap, hold, divisions);
    }
}

fn apply(cmd: Command, keymap: &mut Keymap, hold: &mut Hold, divisions: &mut [Division]) {
    match cmd {
        Command::KeyOff { note, mask } => {
            let mask = if hold.is_active() {
                mask & !HOLD_MASK
            } else {
                mask
            };
            keymap.key_off(note as usize, mask);
        }
        Command::KeyOn { note, mask } => keymap.key_on(note as usize, mask),
        Command::CondKeyOff { check, mask } => keymap.cond_key_off(check, mask),
        Command::CondKeyOn { check, mask } => keymap.cond_key_on(check, mask),
        Command::ClrDivMask { divis, mask } => {
            if let Some(d) = divisions.get_mut(divis as usize) {
                d.clr_div_mask(mask);
            }
        }
        Command::SetDivMask { divis, mask } => {
            if let Some(d) = divisions.get_mut(divis as usize) {
                d.set_div_mask(mask);
            }
        }
        Command::ClrRankMask { divis, rank, mask } => {
            if let Some(d) = divisions.get_mut(divis as usize) {
                d.clr_rank_mask(rank as usize, mask);
            }
        }
        Command::SetRankMask { divis, rank, mask } => {
            if let Some(d) = divisions.get_mut(divis as usize) {
                d.set_rank_mask(rank as usize, mask);
            }
        }
        Command::HoldOff => hold.release(keymap),
        Command::HoldOn { check } => hold.engage(keymap, check),
        Command::Tremulant { divis, on } => {
            if let Some(d) = divisions.get_mut(divis as usize) {
                if on {
                    d.trem_on();
                } else {
                    d.trem_off();
                }
            }
        }
        Command::DivParam { divis, param, value } => {
            if let Some(d) = divisions.get_mut(divis as usize) {
                match param {
                    montre_core::DivParamId::Swell => d.set_swell(value),
                    montre_core::DivParamId::TremFreq => d.set_trem_freq(value),
                    montre_core::DivParamId::TremMod => d.set_trem_mod(value),
                }
            }
        }
    }
}
