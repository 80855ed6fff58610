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

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::engine::{DEFAULT_BLOCK_SIZE, DEFAULT_VOICES, MAX_BLOCK_SIZE, MAX_VOICES};
use crate::samples::{Oversampling, DEFAULT_PRELOAD_SIZE};

const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_MODIFICATION_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    /// Output sample rate in Hz (default: 48000).
    sample_rate: Option<u32>,

    /// Largest block passed to a single render call (default: 1024).
    samples_per_block: Option<usize>,

    /// Size of the voice pool (default: 64).
    num_voices: Option<usize>,

    /// Frames decoded per step when loading samples (default: 8192). Samples are always held
    /// in memory in full.
    preload_size: Option<u32>,

    /// Sample data oversampling factor: 1, 2, 4 or 8 (default: 1).
    oversampling: Option<u32>,

    /// Instrument file to load at startup.
    instrument: Option<String>,

    /// Master volume in dB (default: 0).
    volume: Option<f32>,

    /// How often to look for changes to the instrument file, e.g. "1s" or "500ms".
    modification_check_interval: Option<String>,
}

impl EngineConfig {
    /// Deserializes a file from the path into an engine configuration.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?)
    }

    /// Replaces the startup instrument.
    pub fn with_instrument(mut self, instrument: &Path) -> EngineConfig {
        self.instrument = Some(instrument.to_string_lossy().to_string());
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE).max(1)
    }

    pub fn samples_per_block(&self) -> usize {
        self.samples_per_block
            .unwrap_or(DEFAULT_BLOCK_SIZE)
            .clamp(1, MAX_BLOCK_SIZE)
    }

    pub fn num_voices(&self) -> usize {
        self.num_voices.unwrap_or(DEFAULT_VOICES).clamp(1, MAX_VOICES)
    }

    pub fn preload_size(&self) -> u32 {
        self.preload_size.unwrap_or(DEFAULT_PRELOAD_SIZE)
    }

    pub fn oversampling(&self) -> Result<Oversampling, ConfigError> {
        match self.oversampling {
            Some(factor) => Oversampling::try_from(factor).map_err(ConfigError::InvalidSetting),
            None => Ok(Oversampling::default()),
        }
    }

    pub fn instrument(&self) -> Option<PathBuf> {
        self.instrument.as_ref().map(PathBuf::from)
    }

    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(0.0)
    }

    pub fn modification_check_interval(&self) -> Result<Duration, ConfigError> {
        match &self.modification_check_interval {
            Some(interval) => Ok(DurationString::from_string(interval.clone())
                .map_err(|e| ConfigError::InvalidDuration {
                    value: interval.clone(),
                    message: e.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_MODIFICATION_CHECK_INTERVAL),
        }
    }

    /// The modification check interval in output frames, at least one.
    pub fn modification_check_frames(&self) -> Result<usize, ConfigError> {
        let interval = self.modification_check_interval()?;
        Ok(((interval.as_secs_f64() * self.sample_rate() as f64).round() as usize).max(1))
    }
}
