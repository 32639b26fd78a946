//! The model thread: the instrument's logical state.
//!
//! The model owns what the organist sees (divisions, stops, tuning, routing)
//! and translates it into what the audio thread executes (command words,
//! rank installs). It blocks on its inbox; the audio thread never waits for
//! it.

use crate::engine::instr;
use crate::msg::{AudioMsg, BuildJob, EngineReply, WorkerJob};
use crossbeam_channel::{Receiver, Sender};
use montre_core::{Command, Consumer, DivParamId, ParamSet, Producer, FOLLOW_MASK, HOLD_MASK};
use montre_midi::{cc, MidiMap};
use montre_synth::{Rankwave, StopDef, TEMPERAMENTS};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A division as defined by the instrument.
#[derive(Debug, Clone)]
pub struct DivisionDef {
    pub label: String,
    /// Audio section this division feeds.
    pub asect: usize,
    /// Keyboard (0-5) that plays this division by default.
    pub keyboard: u8,
    pub has_swell: bool,
    pub has_trem: bool,
    /// Initial swell position (0-1).
    pub swell: f32,
    /// Initial tremulant frequency in Hz.
    pub tfreq: f32,
    /// Initial tremulant depth.
    pub tmodd: f32,
    pub stops: Vec<StopDef>,
}

impl DivisionDef {
    pub fn new(label: &str, asect: usize, keyboard: u8) -> Self {
        Self {
            label: label.to_owned(),
            asect,
            keyboard,
            has_swell: true,
            has_trem: true,
            swell: 1.0,
            tfreq: 4.0,
            tmodd: 0.25,
            stops: Vec::new(),
        }
    }

    pub fn with_stop(mut self, stop: StopDef) -> Self {
        self.stops.push(stop);
        self
    }
}

/// The whole instrument definition.
#[derive(Debug, Clone)]
pub struct Instrument {
    /// Tuning frequency of A.
    pub fbase: f32,
    /// Index into [`TEMPERAMENTS`].
    pub temper: usize,
    pub divisions: Vec<DivisionDef>,
}

impl Instrument {
    pub fn new(fbase: f32, temper: usize) -> Self {
        Self {
            fbase,
            temper,
            divisions: Vec::new(),
        }
    }

    pub fn with_division(mut self, d: DivisionDef) -> Self {
        self.divisions.push(d);
        self
    }
}

/// Events accepted by the model thread.
#[derive(Debug)]
pub enum ModelEvent {
    /// Draw a stop: the rank starts following its division's mask.
    StopOn { divis: usize, rank: usize },
    /// Retire a stop.
    StopOff { divis: usize, rank: usize },
    TremulantOn { divis: usize },
    TremulantOff { divis: usize },
    /// Swell position 0-1.
    SetSwell { divis: usize, value: f32 },
    /// Tremulant frequency in Hz.
    SetTremFreq { divis: usize, value: f32 },
    /// Tremulant depth.
    SetTremMod { divis: usize, value: f32 },
    SetVolume(f32),
    /// Constant linear gain for one division.
    SetDivisionVolume { divis: usize, value: f32 },
    SetReverbSize(f32),
    SetReverbTime(f32),
    SetStereoPos(f32),
    /// Route a MIDI channel to a keyboard.
    SetRoute { channel: u8, keyboard: u8, on: bool },
    /// Retune the whole instrument; every rank is rebuilt.
    Retune { fbase: f32, temper: usize },
    /// Force-release every note on the given keyboard mask.
    AllNotesOff { mask: u8 },
    HoldOn { keyboard: u8 },
    HoldOff,
    /// Drain the MIDI control queue.
    MidiPoll,
    /// A finished rank from the worker.
    RankBuilt {
        divis: usize,
        rank: usize,
        wave: Box<Rankwave>,
    },
    /// A failed rank build; the stop is disabled.
    RankFailed { divis: usize, rank: usize },
    Exit,
}

/// Notifications broadcast to the UI thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    RankReady { divis: usize, rank: usize },
    RankFailed { divis: usize, rank: usize },
    StopChanged {
        divis: usize,
        rank: usize,
        engaged: bool,
    },
    Retuned,
}

#[derive(Debug)]
struct StopState {
    def: StopDef,
    engaged: bool,
    ready: bool,
    failed: bool,
}

#[derive(Debug)]
struct DivisState {
    keyboard: u8,
    has_swell: bool,
    has_trem: bool,
    stops: Vec<StopState>,
}

pub(crate) struct Model {
    events: Receiver<ModelEvent>,
    replies: Receiver<EngineReply>,
    commands: Producer<u32>,
    controls: Consumer<u8>,
    audio: Sender<AudioMsg>,
    worker: Sender<WorkerJob>,
    midimap: Arc<MidiMap>,
    params: Arc<ParamSet<4>>,
    ui: Sender<UiEvent>,
    divisions: Vec<DivisState>,
    defs: Vec<DivisionDef>,
    fsamp: f32,
    fbase: f32,
    temper: usize,
    cache_dir: Option<PathBuf>,
    hold_mask: u8,
}

#[allow(clippy::too_many_arguments)]
impl Model {
    pub fn new(
        instrument: Instrument,
        fsamp: f32,
        cache_dir: Option<PathBuf>,
        events: Receiver<ModelEvent>,
        replies: Receiver<EngineReply>,
        commands: Producer<u32>,
        controls: Consumer<u8>,
        audio: Sender<AudioMsg>,
        worker: Sender<WorkerJob>,
        midimap: Arc<MidiMap>,
        params: Arc<ParamSet<4>>,
        ui: Sender<UiEvent>,
    ) -> Self {
        let divisions = instrument
            .divisions
            .iter()
            .map(|d| DivisState {
                keyboard: d.keyboard,
                has_swell: d.has_swell,
                has_trem: d.has_trem,
                stops: d
                    .stops
                    .iter()
                    .map(|s| StopState {
                        def: s.clone(),
                        engaged: false,
                        ready: false,
                        failed: false,
                    })
                    .collect(),
            })
            .collect();
        Self {
            events,
            replies,
            commands,
            controls,
            audio,
            worker,
            midimap,
            params,
            ui,
            divisions,
            defs: instrument.divisions,
            fsamp,
            fbase: instrument.fbase,
            temper: instrument.temper.min(TEMPERAMENTS.len() - 1),
            cache_dir,
            hold_mask: 0,
        }
    }

    pub fn run(mut self) {
        self.startup();
        let events = self.events.clone();
        let replies = self.replies.clone();
        // The MIDI thread cannot wake this one, so the control ring is
        // drained on a short tick as well as on explicit polls.
        let ticker = crossbeam_channel::tick(std::time::Duration::from_millis(5));
        loop {
            crossbeam_channel::select! {
                recv(events) -> ev => match ev {
                    Ok(ModelEvent::Exit) | Err(_) => break,
                    Ok(ev) => self.handle_event(ev),
                },
                recv(replies) -> reply => {
                    if let Ok(r) = reply {
                        self.handle_reply(r);
                    }
                },
                recv(ticker) -> _ => self.drain_controls(),
            }
        }
        self.drain_controls();
        let _ = self.worker.send(WorkerJob::Exit);
        info!("model thread exiting");
    }

    /// Announce divisions to the audio thread, seed the default channel
    /// routing (channel n plays keyboard n) and queue every rank build.
    fn startup(&mut self) {
        for (d, def) in self.defs.clone().iter().enumerate() {
            let _ = self.audio.send(AudioMsg::NewDivision {
                asect: def.asect,
                dmask: 1 << def.keyboard,
                swell: def.swell,
                tfreq: def.tfreq,
                tmodd: def.tmodd,
            });
            self.midimap
                .modify(|m| m.set_route(def.keyboard, def.keyboard, true));
            for r in 0..def.stops.len() {
                self.dispatch_build(d, r);
            }
        }
    }

    fn dispatch_build(&mut self, divis: usize, rank: usize) {
        let Some(stop) = self
            .divisions
            .get_mut(divis)
            .and_then(|d| d.stops.get_mut(rank))
        else {
            return;
        };
        stop.ready = false;
        stop.failed = false;
        let job = BuildJob {
            divis,
            rank,
            stop: stop.def.clone(),
            fsamp: self.fsamp,
            fbase: self.fbase,
            scale: TEMPERAMENTS[self.temper].ratios,
            cache_dir: self.cache_dir.clone(),
        };
        if self.worker.send(WorkerJob::Build(job)).is_err() {
            warn!(divis, rank, "worker is gone, rank build dropped");
        }
    }

    fn send_command(&mut self, cmd: Command) {
        let (word, extra) = cmd.encode();
        let need = 1 + extra.is_some() as usize;
        if self.commands.write_avail() < need {
            // The queue is sized for worst-case fan-in; this is a bug, not
            // an operating condition.
            warn!(?cmd, "command queue full");
            return;
        }
        self.commands.write(0, word);
        if let Some(x) = extra {
            self.commands.write(1, x);
        }
        self.commands.write_commit(need);
    }

    fn handle_event(&mut self, ev: ModelEvent) {
        match ev {
            ModelEvent::StopOn { divis, rank } => self.set_stop(divis, rank, true),
            ModelEvent::StopOff { divis, rank } => self.set_stop(divis, rank, false),
            ModelEvent::TremulantOn { divis } => {
                if self.division_has_trem(divis) {
                    self.send_command(Command::Tremulant {
                        divis: divis as u8,
                        on: true,
                    });
                }
            }
            ModelEvent::TremulantOff { divis } => {
                if self.division_has_trem(divis) {
                    self.send_command(Command::Tremulant {
                        divis: divis as u8,
                        on: false,
                    });
                }
            }
            ModelEvent::SetSwell { divis, value } => {
                self.div_param(divis, DivParamId::Swell, value.clamp(0.0, 1.0))
            }
            ModelEvent::SetTremFreq { divis, value } => {
                self.div_param(divis, DivParamId::TremFreq, value.clamp(1.0, 10.0))
            }
            ModelEvent::SetTremMod { divis, value } => {
                self.div_param(divis, DivParamId::TremMod, value.clamp(0.0, 0.6))
            }
            ModelEvent::SetVolume(v) => self.params.set(instr::VOLUME, v),
            ModelEvent::SetDivisionVolume { divis, value } => {
                if divis < self.divisions.len() {
                    let _ = self.audio.send(AudioMsg::DivisionVolume {
                        divis,
                        gain: value.clamp(0.0, 4.0),
                    });
                }
            }
            ModelEvent::SetReverbSize(v) => self.params.set(instr::REVSIZE, v),
            ModelEvent::SetReverbTime(v) => self.params.set(instr::REVTIME, v),
            ModelEvent::SetStereoPos(v) => self.params.set(instr::STPOSIT, v),
            ModelEvent::SetRoute {
                channel,
                keyboard,
                on,
            } => self.midimap.modify(|m| m.set_route(channel, keyboard, on)),
            ModelEvent::Retune { fbase, temper } => self.retune(fbase, temper),
            ModelEvent::AllNotesOff { mask } => self.send_command(Command::CondKeyOff {
                check: mask,
                mask,
            }),
            ModelEvent::HoldOn { keyboard } => self.hold_on(1 << keyboard.min(5)),
            ModelEvent::HoldOff => self.hold_off(),
            ModelEvent::MidiPoll => self.drain_controls(),
            ModelEvent::RankBuilt { divis, rank, wave } => {
                let (pan, del_ms) = match self
                    .divisions
                    .get(divis)
                    .and_then(|d| d.stops.get(rank))
                {
                    Some(s) => (s.def.pan, s.def.del_ms),
                    None => return,
                };
                let _ = self.audio.send(AudioMsg::SetRank {
                    divis,
                    rank,
                    wave,
                    pan,
                    del_ms,
                });
            }
            ModelEvent::RankFailed { divis, rank } => {
                if let Some(s) = self
                    .divisions
                    .get_mut(divis)
                    .and_then(|d| d.stops.get_mut(rank))
                {
                    s.failed = true;
                }
                let _ = self.ui.send(UiEvent::RankFailed { divis, rank });
            }
            ModelEvent::Exit => unreachable!("handled by run()"),
        }
    }

    fn handle_reply(&mut self, reply: EngineReply) {
        match reply {
            EngineReply::RankInstalled { divis, rank } => {
                let engaged = match self
                    .divisions
                    .get_mut(divis)
                    .and_then(|d| d.stops.get_mut(rank))
                {
                    Some(s) => {
                        s.ready = true;
                        s.engaged
                    }
                    None => return,
                };
                if engaged {
                    self.send_command(Command::SetRankMask {
                        divis: divis as u8,
                        rank: rank as u8,
                        mask: FOLLOW_MASK,
                    });
                }
                let _ = self.ui.send(UiEvent::RankReady { divis, rank });
            }
            EngineReply::Sync => {}
        }
    }

    fn division_has_trem(&self, divis: usize) -> bool {
        self.divisions.get(divis).is_some_and(|d| d.has_trem)
    }

    fn div_param(&mut self, divis: usize, param: DivParamId, value: f32) {
        if divis >= self.divisions.len() {
            return;
        }
        self.send_command(Command::DivParam {
            divis: divis as u8,
            param,
            value,
        });
    }

    fn set_stop(&mut self, divis: usize, rank: usize, engaged: bool) {
        let Some(s) = self
            .divisions
            .get_mut(divis)
            .and_then(|d| d.stops.get_mut(rank))
        else {
            return;
        };
        if s.failed {
            return;
        }
        s.engaged = engaged;
        let ready = s.ready;
        if ready {
            let cmd = if engaged {
                Command::SetRankMask {
                    divis: divis as u8,
                    rank: rank as u8,
                    mask: FOLLOW_MASK,
                }
            } else {
                Command::ClrRankMask {
                    divis: divis as u8,
                    rank: rank as u8,
                    mask: FOLLOW_MASK,
                }
            };
            self.send_command(cmd);
        }
        let _ = self.ui.send(UiEvent::StopChanged {
            divis,
            rank,
            engaged,
        });
    }

    fn retune(&mut self, fbase: f32, temper: usize) {
        if temper >= TEMPERAMENTS.len() {
            return;
        }
        info!(fbase, temper = TEMPERAMENTS[temper].label, "retuning");
        self.fbase = fbase;
        self.temper = temper;
        for d in 0..self.divisions.len() {
            for r in 0..self.divisions[d].stops.len() {
                self.dispatch_build(d, r);
            }
        }
        let _ = self.ui.send(UiEvent::Retuned);
    }

    /// Engage hold for the given keyboards: the affected divisions start
    /// treating the hold bit as one of their keyboards, and every note
    /// currently down acquires it.
    fn hold_on(&mut self, kb_mask: u8) {
        self.hold_mask |= kb_mask;
        for d in 0..self.divisions.len() {
            if kb_mask & (1 << self.divisions[d].keyboard) != 0 {
                self.commands_set_div_hold(d, true);
            }
        }
        self.send_command(Command::HoldOn { check: kb_mask });
    }

    fn hold_off(&mut self) {
        for d in 0..self.divisions.len() {
            let kb = self.divisions[d].keyboard;
            if self.hold_mask & (1 << kb) != 0 {
                self.commands_set_div_hold(d, false);
            }
        }
        self.hold_mask = 0;
        self.send_command(Command::HoldOff);
    }

    fn commands_set_div_hold(&mut self, divis: usize, on: bool) {
        let cmd = if on {
            Command::SetDivMask {
                divis: divis as u8,
                mask: HOLD_MASK,
            }
        } else {
            Command::ClrDivMask {
                divis: divis as u8,
                mask: HOLD_MASK,
            }
        };
        self.send_command(cmd);
    }

    /// Interpret buffered MIDI controllers. The channel's keyboard routing
    /// selects which divisions a controller touches.
    fn drain_controls(&mut self) {
        while self.controls.read_avail() >= 3 {
            let status = self.controls.read(0);
            let ctrl = self.controls.read(1);
            let value = self.controls.read(2);
            self.controls.read_commit(3);
            if status & 0xf0 != 0xb0 {
                continue;
            }
            self.handle_cc(status & 0x0f, ctrl, value);
        }
    }

    fn handle_cc(&mut self, channel: u8, ctrl: u8, value: u8) {
        let keyboards = self.midimap.snapshot().keyboards(channel);
        if keyboards == 0 {
            return;
        }
        let v = value as f32 / 127.0;
        debug!(channel, ctrl, value, "control change");
        match ctrl {
            cc::SWELL => {
                for d in self.routed_divisions(keyboards) {
                    if self.divisions[d].has_swell {
                        self.div_param(d, DivParamId::Swell, v);
                    }
                }
            }
            cc::TREM_FREQ => {
                for d in self.routed_divisions(keyboards) {
                    self.div_param(d, DivParamId::TremFreq, 2.0 + 6.0 * v);
                }
            }
            cc::TREM_MOD => {
                for d in self.routed_divisions(keyboards) {
                    self.div_param(d, DivParamId::TremMod, 0.6 * v);
                }
            }
            cc::HOLD => {
                if value >= 64 {
                    self.hold_on(keyboards);
                } else {
                    self.hold_off();
                }
            }
            cc::ALL_SOUND_OFF | cc::ALL_NOTES_OFF => self.send_command(Command::CondKeyOff {
                check: keyboards,
                mask: keyboards,
            }),
            _ => {}
        }
    }

    fn routed_divisions(&self, keyboards: u8) -> Vec<usize> {
        self.divisions
            .iter()
            .enumerate()
            .filter(|(_, d)| keyboards & (1 << d.keyboard) != 0)
            .map(|(i, _)| i)
            .collect()
    }
}
