// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The host-facing processor: a synth driven block by block, with parameter changes and
//! file loading handed to the worker thread.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::config::{ConfigError, EngineConfig, PersistedState};
use crate::engine::{Event, Synth, DEFAULT_VOICES};
use crate::instrument::InstrumentLoader;
use crate::samples::{FilePool, Oversampling, DEFAULT_PRELOAD_SIZE};
use crate::worker::{self, Coordinator, Diagnostics, WorkerError, WorkerHandle};

/// How long a freewheeling render waits for the worker before carrying on.
const FREEWHEEL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// The settings a host wants. The processor moves the synth towards these one request at a
/// time.
#[derive(Debug, Clone, PartialEq)]
pub struct Controls {
    pub instrument: Option<Arc<Path>>,
    pub num_voices: usize,
    pub preload_size: u32,
    pub oversampling: Oversampling,
    pub freewheeling: bool,
    /// Master volume in dB.
    pub volume: f32,
}

impl Default for Controls {
    fn default() -> Self {
        Controls {
            instrument: None,
            num_voices: DEFAULT_VOICES,
            preload_size: DEFAULT_PRELOAD_SIZE,
            oversampling: Oversampling::default(),
            freewheeling: false,
            volume: 0.0,
        }
    }
}

impl Controls {
    /// Controls matching the startup configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Controls, ConfigError> {
        Ok(Controls {
            instrument: config.instrument().map(|path| Arc::from(path.as_path())),
            num_voices: config.num_voices(),
            preload_size: config.preload_size(),
            oversampling: config.oversampling()?,
            freewheeling: false,
            volume: config.volume(),
        })
    }
}

impl From<&PersistedState> for Controls {
    fn from(state: &PersistedState) -> Self {
        Controls {
            instrument: state.instrument.as_deref().map(Arc::from),
            num_voices: state.num_voices,
            preload_size: state.preload_size,
            oversampling: state.oversampling,
            ..Controls::default()
        }
    }
}

pub struct Processor {
    synth: Synth,
    // Dropped before the worker handle so the worker sees its channels close.
    coordinator: Coordinator,
    _worker: WorkerHandle,
    diagnostics: Arc<RwLock<Diagnostics>>,
}

impl Processor {
    /// Builds the synth and starts the worker. The configured instrument, if any, is loaded
    /// before this returns. A failed load is logged and leaves the synth silent.
    pub fn new(config: &EngineConfig) -> Result<Processor, ProcessorError> {
        let oversampling = config.oversampling()?;
        let check_interval = config.modification_check_frames()?;

        let mut synth = Synth::new(
            config.sample_rate() as f32,
            config.samples_per_block(),
            config.num_voices(),
        );
        let mut loader =
            InstrumentLoader::new(FilePool::new(config.preload_size(), oversampling));
        synth.set_preload_size(loader.preload_size());
        synth.set_oversampling_factor(oversampling);
        synth.set_volume(config.volume());

        let mut diagnostics = Diagnostics::default();
        if let Some(path) = config.instrument() {
            match loader.load_file(&path) {
                Ok(instrument) => {
                    diagnostics.instrument = Some(path);
                    diagnostics.num_regions = instrument.num_regions();
                    diagnostics.missing_samples = instrument.missing_samples().len();
                    synth.set_instrument(Box::new(instrument));
                }
                Err(e) => {
                    warn!(err = %e, "Unable to load startup instrument");
                    diagnostics.last_error = Some(e.to_string());
                }
            }
        }
        diagnostics.preload_size = loader.preload_size();
        diagnostics.cached_files = loader.cached_files();
        diagnostics.memory_usage = loader.memory_usage();

        let diagnostics = Arc::new(RwLock::new(diagnostics));
        let (coordinator, worker) =
            worker::spawn(loader, check_interval, Arc::clone(&diagnostics))?;

        info!(
            sample_rate = synth.sample_rate(),
            samples_per_block = synth.samples_per_block(),
            voices = synth.num_voices(),
            regions = synth.num_regions(),
            "Processor ready"
        );

        Ok(Processor {
            synth,
            coordinator,
            _worker: worker,
            diagnostics,
        })
    }

    /// Renders one block. Worker responses are applied first, then the controls are compared
    /// with the synth and at most one change is requested. When freewheeling, the processor
    /// waits for each requested change before rendering.
    pub fn process(
        &mut self,
        controls: &Controls,
        events: &[Event],
        left: &mut [f32],
        right: &mut [f32],
    ) {
        if let Err(e) = self.coordinator.poll(&mut self.synth) {
            error!(err = %e, "Worker response error");
        }

        if controls.freewheeling != self.synth.is_freewheeling() {
            if controls.freewheeling {
                self.synth.enable_freewheeling();
            } else {
                self.synth.disable_freewheeling();
            }
        }
        self.synth.set_volume(controls.volume);

        loop {
            if self.synth.is_freewheeling() && self.coordinator.is_pending() {
                if let Err(e) = self.coordinator.wait(&mut self.synth, FREEWHEEL_TIMEOUT) {
                    error!(err = %e, "Worker response error");
                    break;
                }
            }
            let sent = match self.coordinator.check_parameters(controls, &self.synth) {
                Ok(sent) => sent,
                Err(e) => {
                    error!(err = %e, "Unable to request parameter change");
                    false
                }
            };
            if !sent || !self.synth.is_freewheeling() {
                break;
            }
        }

        self.synth.render(events, left, right);

        let frames = left.len().min(right.len());
        if let Err(e) = self.coordinator.tick(frames, &self.synth) {
            error!(err = %e, "Unable to request housekeeping");
        }
    }

    /// The settings to save for the next session.
    pub fn state(&self) -> PersistedState {
        PersistedState {
            instrument: self
                .synth
                .instrument()
                .source()
                .map(|path| path.to_path_buf()),
            num_voices: self.synth.num_voices(),
            preload_size: self.synth.preload_size(),
            oversampling: self.synth.oversampling_factor(),
        }
    }

    /// A copy of the worker's loader state. Takes a lock, so keep it off the render thread.
    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().clone()
    }

    pub fn synth(&self) -> &Synth {
        &self.synth
    }

    /// True while a request to the worker is outstanding.
    pub fn is_pending(&self) -> bool {
        self.coordinator.is_pending()
    }
}
