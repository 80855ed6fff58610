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

//! The render thread's side of the worker protocol.
//!
//! At most one request is outstanding at a time. A new request is only submitted once the
//! response to the previous one has been applied, so parameter changes are handled in
//! order and the render thread never waits on the worker.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use tracing::{debug, error, info, warn, Level};

use super::error::WorkerError;
use super::request::{Request, RequestKind, Response, Retired, StatusSnapshot};
use crate::engine::{Synth, MAX_VOICES};
use crate::instrument::{Instrument, LoadError};
use crate::processor::Controls;
use crate::samples::Oversampling;

/// Values the worker could not apply. They are not requested again until the desired
/// value changes.
#[derive(Debug, Default)]
struct Rejected {
    instrument: Option<Arc<Path>>,
    num_voices: Option<usize>,
    preload_size: Option<u32>,
    oversampling: Option<Oversampling>,
}

pub struct Coordinator {
    requests: Sender<Request>,
    responses: Receiver<Response>,
    retired: Sender<Retired>,

    /// The request waiting for a response, if any.
    pending: Option<RequestKind>,
    rejected: Rejected,

    /// A replaced value waiting for room in the retire queue.
    deferred: Option<Retired>,

    check_interval: usize,
    samples_since_check: usize,
    check_due: bool,
    status_due: bool,
    status_logging: bool,
}

impl Coordinator {
    pub(crate) fn new(
        requests: Sender<Request>,
        responses: Receiver<Response>,
        retired: Sender<Retired>,
        check_interval: usize,
    ) -> Coordinator {
        Coordinator {
            requests,
            responses,
            retired,
            pending: None,
            rejected: Rejected::default(),
            deferred: None,
            check_interval: check_interval.max(1),
            samples_since_check: 0,
            check_due: false,
            status_due: false,
            status_logging: tracing::enabled!(Level::DEBUG),
        }
    }

    /// Sends a request unless one is already outstanding. Returns whether it was sent.
    pub fn submit(&mut self, request: Request) -> Result<bool, WorkerError> {
        if self.pending.is_some() {
            return Ok(false);
        }

        let kind = request.kind();
        self.pending = Some(kind);
        match self.requests.try_send(request) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                self.pending = None;
                Err(WorkerError::QueueFull(kind))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.pending = None;
                Err(WorkerError::Disconnected(kind))
            }
        }
    }

    /// The request waiting for a response, if any.
    pub fn pending(&self) -> Option<RequestKind> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Applies every response that has arrived.
    pub fn poll(&mut self, synth: &mut Synth) -> Result<(), WorkerError> {
        self.flush_deferred();
        loop {
            match self.responses.try_recv() {
                Ok(response) => self.apply(response, synth)?,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    return match self.pending.take() {
                        Some(kind) => Err(WorkerError::Disconnected(kind)),
                        None => Ok(()),
                    };
                }
            }
        }
    }

    /// Blocks until the outstanding request is answered or the timeout passes. Only used when
    /// freewheeling, where nothing is waiting on the render thread.
    pub fn wait(&mut self, synth: &mut Synth, timeout: Duration) -> Result<(), WorkerError> {
        let Some(kind) = self.pending else {
            return Ok(());
        };
        match self.responses.recv_timeout(timeout) {
            Ok(response) => self.apply(response, synth),
            Err(RecvTimeoutError::Timeout) => {
                warn!(request = %kind, "Timed out waiting for the worker");
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.pending = None;
                Err(WorkerError::Disconnected(kind))
            }
        }
    }

    fn apply(&mut self, response: Response, synth: &mut Synth) -> Result<(), WorkerError> {
        let got = response.kind();
        if self.pending != Some(got) {
            let expected = self.pending;
            self.retire_response(response);
            return Err(WorkerError::UnexpectedResponse { expected, got });
        }
        self.pending = None;

        match response {
            Response::LoadFile { path, result } => match result {
                Ok(instrument) => {
                    self.rejected.instrument = None;
                    self.install(synth, instrument);
                }
                Err(e) => {
                    error!(path = ?path, err = %e, "Unable to load instrument");
                    self.rejected.instrument = Some(path);
                }
            },
            Response::SetNumVoices { requested, voices } => {
                if voices.len() == requested {
                    self.rejected.num_voices = None;
                    let old = synth.set_voices(voices);
                    self.retire(Retired::Voices(old));
                } else {
                    warn!(
                        requested,
                        received = voices.len(),
                        "Worker returned the wrong number of voices"
                    );
                    self.rejected.num_voices = Some(requested);
                    self.retire(Retired::Voices(voices));
                }
            }
            Response::SetPreloadSize { requested, applied } => {
                if applied != requested {
                    warn!(requested, applied, "Preload size was adjusted");
                    self.rejected.preload_size = Some(requested);
                } else {
                    self.rejected.preload_size = None;
                }
                synth.set_preload_size(applied);
            }
            Response::SetOversampling {
                requested,
                applied,
                instrument,
            } => {
                if applied != requested {
                    warn!(%requested, %applied, "Oversampling factor was not applied");
                    self.rejected.oversampling = Some(requested);
                } else {
                    self.rejected.oversampling = None;
                }
                synth.set_oversampling_factor(applied);
                match instrument {
                    Some(Ok(instrument)) => self.install(synth, instrument),
                    Some(Err(e)) => {
                        error!(err = %e, "Unable to reload instrument with new oversampling")
                    }
                    None => {}
                }
            }
            Response::CheckModification { marker, reload } => match reload {
                Some(Ok(instrument)) => {
                    info!(path = ?marker.path, "Instrument file changed, reloaded");
                    self.install(synth, instrument);
                }
                Some(Err(e)) => {
                    warn!(
                        path = ?marker.path,
                        err = %e,
                        "Instrument file changed but failed to reload"
                    )
                }
                None => {}
            },
            Response::LogStatus => {}
        }

        Ok(())
    }

    fn install(&mut self, synth: &mut Synth, instrument: Box<Instrument>) {
        let old = synth.set_instrument(instrument);
        self.retire(Retired::Instrument(old));
    }

    fn retire_response(&mut self, response: Response) {
        let loaded = |result: Option<Result<Box<Instrument>, LoadError>>| {
            result.and_then(Result::ok).map(Retired::Instrument)
        };
        let retired = match response {
            Response::LoadFile { result, .. } => loaded(Some(result)),
            Response::SetNumVoices { voices, .. } => Some(Retired::Voices(voices)),
            Response::SetOversampling { instrument, .. } => loaded(instrument),
            Response::CheckModification { reload, .. } => loaded(reload),
            Response::SetPreloadSize { .. } | Response::LogStatus => None,
        };
        if let Some(retired) = retired {
            self.retire(retired);
        }
    }

    /// Hands a replaced value to the worker so it is freed off the render thread. When the
    /// queue is full the value is held and sent on a later poll.
    fn retire(&mut self, retired: Retired) {
        self.flush_deferred();
        match self.retired.try_send(retired) {
            Ok(()) => {}
            Err(TrySendError::Full(retired)) if self.deferred.is_none() => {
                self.deferred = Some(retired);
            }
            Err(TrySendError::Full(_)) => {
                warn!("Retire queue full, freeing on the render thread");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Worker gone, freeing on the render thread");
            }
        }
    }

    fn flush_deferred(&mut self) {
        let Some(retired) = self.deferred.take() else {
            return;
        };
        match self.retired.try_send(retired) {
            Ok(()) => {}
            Err(TrySendError::Full(retired)) => self.deferred = Some(retired),
            Err(TrySendError::Disconnected(_)) => {
                debug!("Worker gone, freeing on the render thread");
            }
        }
    }

    /// Compares the desired controls with the synth and requests the first difference.
    pub fn check_parameters(
        &mut self,
        controls: &Controls,
        synth: &Synth,
    ) -> Result<bool, WorkerError> {
        if self.pending.is_some() {
            return Ok(false);
        }

        if let Some(path) = &controls.instrument {
            let loaded = synth.instrument().source().is_some_and(|source| **source == **path);
            let rejected = self
                .rejected
                .instrument
                .as_ref()
                .is_some_and(|rejected| **rejected == **path);
            if !loaded && !rejected {
                return self.submit(Request::LoadFile {
                    path: Arc::clone(path),
                });
            }
        }

        let num_voices = controls.num_voices.clamp(1, MAX_VOICES);
        if num_voices != synth.num_voices() && self.rejected.num_voices != Some(num_voices) {
            return self.submit(Request::SetNumVoices(num_voices));
        }

        if controls.preload_size != synth.preload_size()
            && self.rejected.preload_size != Some(controls.preload_size)
        {
            return self.submit(Request::SetPreloadSize(controls.preload_size));
        }

        if controls.oversampling != synth.oversampling_factor()
            && self.rejected.oversampling != Some(controls.oversampling)
        {
            return self.submit(Request::SetOversampling {
                factor: controls.oversampling,
                reload: synth.instrument().source().cloned(),
            });
        }

        Ok(false)
    }

    /// Advances the housekeeping clock by `frames` and submits periodic requests when due.
    pub fn tick(&mut self, frames: usize, synth: &Synth) -> Result<bool, WorkerError> {
        self.samples_since_check += frames;
        if self.samples_since_check >= self.check_interval {
            self.samples_since_check = 0;
            self.check_due = true;
            self.status_due = self.status_logging;
        }

        if self.check_due {
            match synth.instrument().marker() {
                Some(marker) => {
                    let sent = self.submit(Request::CheckModification(marker.clone()))?;
                    if sent {
                        self.check_due = false;
                    }
                    return Ok(sent);
                }
                None => self.check_due = false,
            }
        }

        if self.status_due {
            let sent = self.submit(Request::LogStatus(StatusSnapshot {
                active_voices: synth.num_active_voices(),
                num_voices: synth.num_voices(),
                num_regions: synth.num_regions(),
                preload_size: synth.preload_size(),
                oversampling: synth.oversampling_factor(),
                freewheeling: synth.is_freewheeling(),
                volume: synth.volume(),
            }))?;
            if sent {
                self.status_due = false;
            }
            return Ok(sent);
        }

        Ok(false)
    }

    #[cfg(test)]
    fn set_status_logging(&mut self, enabled: bool) {
        self.status_logging = enabled;
    }
}
