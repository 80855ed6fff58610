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

//! Sample file decoding and caching.
//!
//! This module provides:
//! - Decoding of audio files into planar f32 data
//! - A file pool that caches decoded files and applies the oversampling factor

use std::fmt;

use serde::{Deserialize, Serialize};

mod decode;
mod error;
mod pool;
mod resample;

pub use decode::decode_file;
pub use error::SampleError;
pub use pool::{FilePool, DEFAULT_PRELOAD_SIZE, MAX_PRELOAD_SIZE, MIN_PRELOAD_SIZE};

/// Decoded sample data, stored per channel. At most two channels are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleData {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl SampleData {
    /// Creates sample data from planar channels. Channels beyond the second are dropped and
    /// all channels are truncated to the shortest one.
    pub fn from_planar(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> SampleData {
        channels.truncate(2);
        if channels.is_empty() {
            channels.push(Vec::new());
        }
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.truncate(frames);
        }
        SampleData {
            channels,
            sample_rate,
        }
    }

    /// Number of frames.
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// The rate of the stored data, which includes any oversampling.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the given channel. Mono data returns its only channel for both sides.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index.min(self.channels.len() - 1)]
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.channels.iter().map(Vec::len).sum::<usize>() * std::mem::size_of::<f32>()
    }
}

/// Internal oversampling applied to sample data when it is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Oversampling {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl Oversampling {
    pub fn factor(&self) -> u32 {
        match self {
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
        }
    }
}

impl TryFrom<u32> for Oversampling {
    type Error = String;

    fn try_from(factor: u32) -> Result<Self, Self::Error> {
        match factor {
            1 => Ok(Oversampling::X1),
            2 => Ok(Oversampling::X2),
            4 => Ok(Oversampling::X4),
            8 => Ok(Oversampling::X8),
            _ => Err(format!(
                "unsupported oversampling factor {}, expected 1, 2, 4 or 8",
                factor
            )),
        }
    }
}

impl From<Oversampling> for u32 {
    fn from(oversampling: Oversampling) -> Self {
        oversampling.factor()
    }
}

impl fmt::Display for Oversampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.factor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_planar_truncates() {
        let data = SampleData::from_planar(
            vec![vec![0.0; 10], vec![0.0; 8], vec![0.0; 10]],
            44100,
        );
        assert_eq!(data.channel_count(), 2);
        assert_eq!(data.frames(), 8);
        assert_eq!(data.memory_size(), 16 * 4);
    }

    #[test]
    fn test_mono_channel_is_shared() {
        let data = SampleData::from_planar(vec![vec![1.0, 2.0]], 44100);
        assert_eq!(data.channel(0), data.channel(1));
    }

    #[test]
    fn test_empty_data() {
        let data = SampleData::from_planar(Vec::new(), 44100);
        assert_eq!(data.frames(), 0);
        assert_eq!(data.channel(1), &[] as &[f32]);
    }

    #[test]
    fn test_oversampling_conversions() {
        assert_eq!(Oversampling::try_from(4), Ok(Oversampling::X4));
        assert!(Oversampling::try_from(3).is_err());
        assert_eq!(u32::from(Oversampling::X8), 8);
        assert_eq!(Oversampling::X2.to_string(), "x2");
    }
}
