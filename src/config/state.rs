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

use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ConfigError;
use crate::engine::DEFAULT_VOICES;
use crate::samples::{Oversampling, DEFAULT_PRELOAD_SIZE};

/// Engine settings saved between sessions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PersistedState {
    pub instrument: Option<PathBuf>,
    pub num_voices: usize,
    pub preload_size: u32,
    pub oversampling: Oversampling,
}

impl Default for PersistedState {
    fn default() -> Self {
        PersistedState {
            instrument: None,
            num_voices: DEFAULT_VOICES,
            preload_size: DEFAULT_PRELOAD_SIZE,
            oversampling: Oversampling::default(),
        }
    }
}

impl PersistedState {
    /// Reads saved state from a YAML file.
    pub fn deserialize(path: &Path) -> Result<PersistedState, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<PersistedState>()?)
    }

    /// Writes the state to a YAML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let serialized = serde_yml::to_string(self)?;
        fs::write(path, serialized)?;
        info!(path = ?path, "Saved engine state");
        Ok(())
    }
}
