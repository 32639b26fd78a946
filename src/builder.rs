//! Wiring: queues, threads and the engine.

use crate::engine::{instr_params, Engine, EngineWiring};
use crate::model::{Instrument, Model, ModelEvent, UiEvent};
use crate::worker::Worker;
use crate::{Error, Result};
use crossbeam_channel::{Receiver, Sender};
use montre_core::{ring, EngineConfig, ParamSet, NASECT, NDIVIS, NRANKS};
use montre_midi::{Dispatcher, MidiMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Builds an [`Organ`]: validates the configuration, creates the rings and
/// channels, starts the model and worker threads.
///
/// # Example
///
/// ```no_run
/// use montre::{DivisionDef, Instrument, OrganBuilder, StopDef};
///
/// let instrument = Instrument::new(440.0, 5).with_division(
///     DivisionDef::new("Great", 0, 0).with_stop(StopDef::new("Principal 8", 36, 96)),
/// );
/// let organ = OrganBuilder::new(instrument)
///     .sample_rate(48_000.0)
///     .channels(2)
///     .build()
///     .unwrap();
/// ```
pub struct OrganBuilder {
    instrument: Instrument,
    config: EngineConfig,
    cache_dir: Option<PathBuf>,
}

impl OrganBuilder {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            config: EngineConfig::default(),
            cache_dir: None,
        }
    }

    /// Replace the whole engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sample_rate(mut self, rate: f32) -> Self {
        self.config.sample_rate = rate;
        self
    }

    pub fn channels(mut self, channels: usize) -> Self {
        self.config.channels = channels;
        self
    }

    /// Emit raw B-format instead of a decoded mix (requires 4 channels).
    pub fn bform(mut self, on: bool) -> Self {
        self.config.bform = on;
        self
    }

    /// Directory for `.ae1` wavetable caches.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<Organ> {
        self.config.validate()?;
        validate_instrument(&self.instrument)?;
        let fsamp = self.config.sample_rate;

        let (note_tx, note_rx) = ring::<u32>(self.config.note_queue)?;
        let (cmd_tx, cmd_rx) = ring::<u32>(self.config.command_queue)?;
        let (ctl_tx, ctl_rx) = ring::<u8>(self.config.control_queue)?;

        // Sized so a full instrument (every division, every rank) can be
        // announced before the engine renders its first block.
        let (audio_tx, audio_rx) = crossbeam_channel::bounded(NDIVIS * (NRANKS + 1));
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(256);
        let (worker_tx, worker_rx) = crossbeam_channel::bounded(256);
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (ui_tx, ui_rx) = crossbeam_channel::unbounded();

        let params = instr_params();
        let midimap = Arc::new(MidiMap::new());

        let engine = Engine::new(
            fsamp,
            self.config.channels,
            self.config.bform,
            NASECT,
            EngineWiring {
                notes: note_rx,
                commands: cmd_rx,
                from_model: audio_rx,
                to_model: reply_tx,
                worker: worker_tx.clone(),
                params: params.clone(),
            },
        );
        let section_params = (0..NASECT)
            .filter_map(|i| engine.section_params(i))
            .collect();

        let worker = Worker::new(worker_rx, event_tx.clone());
        let worker_thread = std::thread::Builder::new()
            .name("montre-worker".into())
            .spawn(move || worker.run())
            .map_err(|e| Error::Instrument(format!("spawning worker: {e}")))?;

        let model = Model::new(
            self.instrument,
            fsamp,
            self.cache_dir,
            event_rx,
            reply_rx,
            cmd_tx,
            ctl_rx,
            audio_tx,
            worker_tx,
            midimap.clone(),
            params.clone(),
            ui_tx,
        );
        let model_thread = std::thread::Builder::new()
            .name("montre-model".into())
            .spawn(move || model.run())
            .map_err(|e| Error::Instrument(format!("spawning model: {e}")))?;

        let dispatcher = Dispatcher::new(midimap.clone(), note_tx, ctl_tx);

        Ok(Organ {
            engine: Some(engine),
            control: Controller { tx: event_tx },
            ui: ui_rx,
            midimap,
            dispatcher: Some(dispatcher),
            params,
            section_params,
            threads: vec![worker_thread, model_thread],
            #[cfg(feature = "driver")]
            stream: None,
        })
    }
}

fn validate_instrument(instrument: &Instrument) -> Result<()> {
    if instrument.divisions.is_empty() || instrument.divisions.len() > NDIVIS {
        return Err(Error::Instrument(format!(
            "need 1-{NDIVIS} divisions, got {}",
            instrument.divisions.len()
        )));
    }
    if instrument.temper >= montre_synth::TEMPERAMENTS.len() {
        return Err(Error::Instrument(format!(
            "temperament index {} out of range",
            instrument.temper
        )));
    }
    for d in &instrument.divisions {
        if d.asect >= NASECT {
            return Err(Error::Instrument(format!(
                "{}: audio section {} out of range",
                d.label, d.asect
            )));
        }
        if d.keyboard > 5 {
            return Err(Error::Instrument(format!(
                "{}: keyboard {} out of range",
                d.label, d.keyboard
            )));
        }
        if d.stops.len() > NRANKS {
            return Err(Error::Instrument(format!(
                "{}: more than {NRANKS} stops",
                d.label
            )));
        }
        for s in &d.stops {
            if s.n0 > s.n1 {
                return Err(Error::Instrument(format!(
                    "{}: empty compass {}..={}",
                    s.name, s.n0, s.n1
                )));
            }
        }
    }
    Ok(())
}

/// Handle for sending events to the model thread.
#[derive(Clone)]
pub struct Controller {
    tx: Sender<ModelEvent>,
}

impl Controller {
    pub fn send(&self, ev: ModelEvent) -> Result<()> {
        self.tx.send(ev).map_err(|_| Error::ControlGone)
    }

    pub fn stop_on(&self, divis: usize, rank: usize) -> Result<()> {
        self.send(ModelEvent::StopOn { divis, rank })
    }

    pub fn stop_off(&self, divis: usize, rank: usize) -> Result<()> {
        self.send(ModelEvent::StopOff { divis, rank })
    }

    pub fn set_volume(&self, v: f32) -> Result<()> {
        self.send(ModelEvent::SetVolume(v))
    }

    pub fn retune(&self, fbase: f32, temper: usize) -> Result<()> {
        self.send(ModelEvent::Retune { fbase, temper })
    }

    pub fn all_notes_off(&self, mask: u8) -> Result<()> {
        self.send(ModelEvent::AllNotesOff { mask })
    }
}

/// The assembled instrument.
///
/// The [`Engine`] is either taken out for a custom host callback
/// ([`take_engine`](Self::take_engine)) or driven by the built-in cpal
/// output ([`start_output`](Self::start_output), feature `driver`).
pub struct Organ {
    engine: Option<Engine>,
    control: Controller,
    ui: Receiver<UiEvent>,
    midimap: Arc<MidiMap>,
    dispatcher: Option<Dispatcher>,
    params: Arc<ParamSet<4>>,
    section_params: Vec<Arc<ParamSet<5>>>,
    threads: Vec<JoinHandle<()>>,
    #[cfg(feature = "driver")]
    stream: Option<cpal::Stream>,
}

impl Organ {
    /// Event sender for the model thread.
    pub fn controller(&self) -> Controller {
        self.control.clone()
    }

    /// UI-bound notifications (rank ready, stop changed, ...).
    pub fn ui_events(&self) -> &Receiver<UiEvent> {
        &self.ui
    }

    /// Take the engine to drive it from your own audio callback.
    pub fn take_engine(&mut self) -> Option<Engine> {
        self.engine.take()
    }

    /// Take the MIDI dispatcher to feed events from your own input layer
    /// (or hand it to [`montre_midi::io::connect`]).
    pub fn take_dispatcher(&mut self) -> Option<Dispatcher> {
        self.dispatcher.take()
    }

    /// The shared MIDI-to-keyboard map.
    pub fn midimap(&self) -> &Arc<MidiMap> {
        &self.midimap
    }

    /// Global instrument parameters (volume, reverb size/time, stereo
    /// position); see [`crate::engine::instr`] for indices.
    pub fn params(&self) -> &Arc<ParamSet<4>> {
        &self.params
    }

    /// Parameter cells of audio section `i`.
    pub fn section_params(&self, i: usize) -> Option<&Arc<ParamSet<5>>> {
        self.section_params.get(i)
    }

    /// Open the default output device and start rendering.
    #[cfg(feature = "driver")]
    pub fn start_output(&mut self) -> Result<()> {
        let engine = self.engine.take().ok_or(Error::AlreadyRunning)?;
        self.stream = Some(crate::driver::start_stream(engine)?);
        Ok(())
    }

    /// Stop the threads and join them. The audio stream (if any) is closed
    /// first.
    pub fn shutdown(mut self) {
        #[cfg(feature = "driver")]
        drop(self.stream.take());
        let _ = self.control.send(ModelEvent::Exit);
        for t in self.threads.drain(..) {
            let _ = t.join();
        }
    }
}
