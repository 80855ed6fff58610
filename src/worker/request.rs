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

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::engine::Voice;
use crate::instrument::{Instrument, LoadError, ModificationMarker};
use crate::samples::Oversampling;

/// The kind of a request, used to pair responses with what is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    LoadFile,
    SetNumVoices,
    SetPreloadSize,
    SetOversampling,
    CheckModification,
    LogStatus,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::LoadFile => "load file",
            RequestKind::SetNumVoices => "set number of voices",
            RequestKind::SetPreloadSize => "set preload size",
            RequestKind::SetOversampling => "set oversampling",
            RequestKind::CheckModification => "check modification",
            RequestKind::LogStatus => "log status",
        };
        f.write_str(name)
    }
}

/// Work sent from the render thread to the worker.
#[derive(Debug)]
pub enum Request {
    LoadFile {
        path: Arc<Path>,
    },
    SetNumVoices(usize),
    SetPreloadSize(u32),
    /// Changes the factor and reloads the given instrument, if any, with it.
    SetOversampling {
        factor: Oversampling,
        reload: Option<Arc<Path>>,
    },
    CheckModification(ModificationMarker),
    LogStatus(StatusSnapshot),
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::LoadFile { .. } => RequestKind::LoadFile,
            Request::SetNumVoices(_) => RequestKind::SetNumVoices,
            Request::SetPreloadSize(_) => RequestKind::SetPreloadSize,
            Request::SetOversampling { .. } => RequestKind::SetOversampling,
            Request::CheckModification(_) => RequestKind::CheckModification,
            Request::LogStatus(_) => RequestKind::LogStatus,
        }
    }
}

/// Results sent from the worker back to the render thread. Everything the render thread
/// installs arrives fully built.
#[derive(Debug)]
pub enum Response {
    LoadFile {
        path: Arc<Path>,
        result: Result<Box<Instrument>, LoadError>,
    },
    SetNumVoices {
        requested: usize,
        voices: Vec<Voice>,
    },
    SetPreloadSize {
        requested: u32,
        applied: u32,
    },
    SetOversampling {
        requested: Oversampling,
        applied: Oversampling,
        instrument: Option<Result<Box<Instrument>, LoadError>>,
    },
    /// `reload` is set when the file had changed and a reload was attempted.
    CheckModification {
        marker: ModificationMarker,
        reload: Option<Result<Box<Instrument>, LoadError>>,
    },
    LogStatus,
}

impl Response {
    pub fn kind(&self) -> RequestKind {
        match self {
            Response::LoadFile { .. } => RequestKind::LoadFile,
            Response::SetNumVoices { .. } => RequestKind::SetNumVoices,
            Response::SetPreloadSize { .. } => RequestKind::SetPreloadSize,
            Response::SetOversampling { .. } => RequestKind::SetOversampling,
            Response::CheckModification { .. } => RequestKind::CheckModification,
            Response::LogStatus => RequestKind::LogStatus,
        }
    }
}

/// Values replaced on the render thread, sent to the worker to be freed.
#[derive(Debug)]
pub enum Retired {
    Instrument(Box<Instrument>),
    Voices(Vec<Voice>),
}

/// Engine state captured on the render thread for periodic logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    pub active_voices: usize,
    pub num_voices: usize,
    pub num_regions: usize,
    pub preload_size: u32,
    pub oversampling: Oversampling,
    pub freewheeling: bool,
    pub volume: f32,
}
