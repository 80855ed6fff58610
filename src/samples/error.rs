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

use std::path::PathBuf;

/// Error types for sample decoding.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Audio file error for {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("No audio track found in {0}")]
    NoTrack(PathBuf),

    #[error("Unsupported audio file {0}: {1}")]
    Unsupported(PathBuf, String),

    #[error("Unable to oversample {path} from {from} Hz to {to} Hz")]
    ResamplingFailed { path: PathBuf, from: u32, to: u32 },
}
