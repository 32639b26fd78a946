//! The background rank builder.
//!
//! Rank builds take seconds each, so they run on a below-normal thread far
//! from the audio path. For every job the worker probes the wavetable cache
//! first; a miss (or any mismatch) means computing the tables and writing
//! the cache back. Finished ranks go to the model, which forwards them to
//! the audio thread. Retired ranks come back here to die.

use crate::model::ModelEvent;
use crate::msg::{BuildJob, WorkerJob};
use crossbeam_channel::{Receiver, Sender};
use montre_synth::Rankwave;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub(crate) struct Worker {
    jobs: Receiver<WorkerJob>,
    model: Sender<ModelEvent>,
}

impl Worker {
    pub fn new(jobs: Receiver<WorkerJob>, model: Sender<ModelEvent>) -> Self {
        Self { jobs, model }
    }

    pub fn run(self) {
        while let Ok(job) = self.jobs.recv() {
            match job {
                WorkerJob::Build(job) => self.build(job),
                WorkerJob::Dispose(wave) => drop(wave),
                WorkerJob::Exit => break,
            }
        }
        // Drain any late disposals before the thread goes away.
        while let Ok(job) = self.jobs.try_recv() {
            if let WorkerJob::Dispose(wave) = job {
                drop(wave);
            }
        }
    }

    fn build(&self, job: BuildJob) {
        let BuildJob {
            divis,
            rank,
            stop,
            fsamp,
            fbase,
            scale,
            cache_dir,
        } = job;

        let mut wave = Box::new(Rankwave::new(stop.n0, stop.n1));
        let cache = cache_dir.map(|dir| cache_path(&dir, &stop.name));

        let loaded = cache
            .as_ref()
            .map(|path| match wave.load_file(path, fsamp, fbase, &scale) {
                Ok(()) => {
                    debug!(stop = %stop.name, ?path, "loaded cached wavetables");
                    true
                }
                Err(e) => {
                    debug!(stop = %stop.name, %e, "cache miss, computing");
                    false
                }
            })
            .unwrap_or(false);

        if !loaded {
            info!(stop = %stop.name, "computing rank wavetables");
            if let Err(e) = wave.gen_waves(&stop, fsamp, fbase, &scale) {
                warn!(stop = %stop.name, %e, "rank build failed");
                let _ = self.model.send(ModelEvent::RankFailed { divis, rank });
                return;
            }
            if let Some(path) = &cache {
                if let Err(e) = wave.save_file(path, fsamp, fbase, &scale) {
                    warn!(stop = %stop.name, %e, "could not write wavetable cache");
                }
            }
        }

        let _ = self.model.send(ModelEvent::RankBuilt { divis, rank, wave });
    }
}

fn cache_path(dir: &PathBuf, stop_name: &str) -> PathBuf {
    let stem: String = stop_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    dir.join(format!("{stem}.ae1"))
}
