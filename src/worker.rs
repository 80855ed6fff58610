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

//! Background work for the render thread.
//!
//! Loading instruments, building voice pools and freeing replaced state all happen on a
//! low priority worker thread. The render thread talks to it through bounded channels and
//! never blocks on it.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::Builder;
use std::time::Duration;

use crossbeam_channel::bounded;
use parking_lot::RwLock;
use tracing::info;

use crate::instrument::InstrumentLoader;

mod coordinator;
mod error;
mod request;
mod thread;

pub use coordinator::Coordinator;
pub use error::WorkerError;
pub use request::{Request, RequestKind, Response, Retired, StatusSnapshot};
pub use thread::WorkerHandle;

/// Replaced values that can wait to be freed before the render thread falls back to
/// freeing them itself.
const RETIRED_CAPACITY: usize = 8;

/// Loader state published by the worker. Read it from a non-realtime thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub instrument: Option<PathBuf>,
    pub num_regions: usize,
    pub missing_samples: usize,
    pub cached_files: usize,
    /// Bytes of decoded sample data held by the loader.
    pub memory_usage: usize,
    pub last_load_time: Option<Duration>,
    pub last_error: Option<String>,
    /// Frames decoded per step for files loaded from now on.
    pub preload_size: u32,
    pub requests_handled: u64,
}

/// Starts the worker thread. `check_interval` is the number of rendered frames between
/// checks of the instrument file for changes.
pub fn spawn(
    loader: InstrumentLoader,
    check_interval: usize,
    diagnostics: Arc<RwLock<Diagnostics>>,
) -> Result<(Coordinator, WorkerHandle), WorkerError> {
    let (request_tx, request_rx) = bounded(1);
    let (response_tx, response_rx) = bounded(1);
    let (retired_tx, retired_rx) = bounded(RETIRED_CAPACITY);

    let worker = thread::Worker::new(loader, diagnostics);
    let join_handle = Builder::new()
        .name("sfz-worker".to_string())
        .spawn(move || worker.run(request_rx, response_tx, retired_rx))?;
    info!(check_interval, "Worker thread started");

    Ok((
        Coordinator::new(request_tx, response_rx, retired_tx, check_interval),
        WorkerHandle::new(join_handle),
    ))
}
