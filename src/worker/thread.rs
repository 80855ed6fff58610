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

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::RwLock;
use thread_priority::{set_current_thread_priority, ThreadPriority};
use tracing::{debug, error, info, warn};

use super::request::{Request, Response, Retired};
use super::Diagnostics;
use crate::engine::voice_pool;
use crate::instrument::{Instrument, InstrumentLoader, LoadError};

/// Joins the worker thread when dropped. The thread exits once the coordinator's channels
/// are closed, so the coordinator must be dropped first.
pub struct WorkerHandle {
    join_handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(super) fn new(join_handle: JoinHandle<()>) -> WorkerHandle {
        WorkerHandle {
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(join_handle) = self.join_handle.take() {
            if join_handle.join().is_err() {
                error!("Error joining worker thread");
            }
        }
    }
}

/// Executes requests on the worker thread.
pub(super) struct Worker {
    loader: InstrumentLoader,
    diagnostics: Arc<RwLock<Diagnostics>>,
}

impl Worker {
    pub(super) fn new(loader: InstrumentLoader, diagnostics: Arc<RwLock<Diagnostics>>) -> Worker {
        diagnostics.write().preload_size = loader.preload_size();
        Worker {
            loader,
            diagnostics,
        }
    }

    /// Serves requests until either channel from the render thread closes.
    pub(super) fn run(
        mut self,
        requests: Receiver<Request>,
        responses: Sender<Response>,
        retired: Receiver<Retired>,
    ) {
        if let Err(e) = set_current_thread_priority(ThreadPriority::Min) {
            warn!(err = ?e, "Unable to lower worker thread priority");
        }
        debug!("Worker started");

        loop {
            select! {
                recv(requests) -> request => {
                    let Ok(request) = request else {
                        break;
                    };
                    let response = self.handle(request);
                    if responses.send(response).is_err() {
                        break;
                    }
                },
                recv(retired) -> retired => {
                    let Ok(retired) = retired else {
                        break;
                    };
                    self.free(retired);
                },
            }
        }

        debug!("Worker stopped");
    }

    pub(super) fn handle(&mut self, request: Request) -> Response {
        let kind = request.kind();
        debug!(request = %kind, "Handling request");
        self.diagnostics.write().requests_handled += 1;

        match request {
            Request::LoadFile { path } => {
                let result = self.load(&path);
                Response::LoadFile { path, result }
            }
            Request::SetNumVoices(requested) => Response::SetNumVoices {
                requested,
                voices: voice_pool(requested),
            },
            Request::SetPreloadSize(requested) => {
                self.loader.set_preload_size(requested);
                let applied = self.loader.preload_size();
                self.diagnostics.write().preload_size = applied;
                Response::SetPreloadSize { requested, applied }
            }
            Request::SetOversampling { factor, reload } => {
                self.loader.set_oversampling(factor);
                let instrument = reload.map(|path| self.load(&path));
                Response::SetOversampling {
                    requested: factor,
                    applied: self.loader.oversampling(),
                    instrument,
                }
            }
            Request::CheckModification(marker) => {
                let reload = if marker.is_stale() {
                    info!(path = ?marker.path, "Instrument file changed on disk");
                    Some(self.load(&marker.path))
                } else {
                    None
                };
                Response::CheckModification { marker, reload }
            }
            Request::LogStatus(status) => {
                let diagnostics = self.diagnostics.read();
                debug!(
                    active_voices = status.active_voices,
                    num_voices = status.num_voices,
                    regions = status.num_regions,
                    preload_size = status.preload_size,
                    oversampling = %status.oversampling,
                    freewheeling = status.freewheeling,
                    volume = status.volume,
                    cached_files = diagnostics.cached_files,
                    memory_kb = diagnostics.memory_usage / 1024,
                    "Synth status"
                );
                Response::LogStatus
            }
        }
    }

    fn load(&mut self, path: &Path) -> Result<Box<Instrument>, LoadError> {
        let start = Instant::now();
        let result = self.loader.load_file(path).map(Box::new);

        let mut diagnostics = self.diagnostics.write();
        diagnostics.last_load_time = Some(start.elapsed());
        match &result {
            Ok(instrument) => {
                diagnostics.instrument = Some(path.to_path_buf());
                diagnostics.num_regions = instrument.num_regions();
                diagnostics.missing_samples = instrument.missing_samples().len();
                diagnostics.last_error = None;
            }
            Err(e) => diagnostics.last_error = Some(e.to_string()),
        }
        diagnostics.cached_files = self.loader.cached_files();
        diagnostics.memory_usage = self.loader.memory_usage();

        result
    }

    fn free(&mut self, retired: Retired) {
        match retired {
            Retired::Instrument(instrument) => {
                debug!(regions = instrument.num_regions(), "Freeing replaced instrument");
                drop(instrument);
                self.loader.collect_unused();

                let mut diagnostics = self.diagnostics.write();
                diagnostics.cached_files = self.loader.cached_files();
                diagnostics.memory_usage = self.loader.memory_usage();
            }
            Retired::Voices(voices) => {
                debug!(voices = voices.len(), "Freeing replaced voice pool");
            }
        }
    }
}
