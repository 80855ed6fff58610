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

use std::{
    error::Error,
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::instrument::Instrument;
use crate::opcode::Opcode;
use crate::region::Region;
use crate::samples::SampleData;

mod polling;

pub use polling::eventually;

/// Writes planar channel data to a WAV file. Float data is written as 32-bit float, integer
/// data at its native width.
pub fn write_wav<S: hound::Sample + Copy + 'static>(
    path: &Path,
    channels: &[Vec<S>],
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let sample_format = if std::any::TypeId::of::<S>() == std::any::TypeId::of::<f32>() {
        SampleFormat::Float
    } else if std::any::TypeId::of::<S>() == std::any::TypeId::of::<i32>()
        || std::any::TypeId::of::<S>() == std::any::TypeId::of::<i16>()
    {
        SampleFormat::Int
    } else {
        return Err("Unsupported sample format".into());
    };

    let num_channels = channels.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample: (std::mem::size_of::<S>() * 8) as u16,
            sample_format,
        },
    )?;

    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;

    Ok(())
}

/// Writes instrument text into the given directory and returns its path.
pub fn write_sfz(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("unable to write instrument file");
    path
}

/// A constant mono sample, handy for checking gains.
pub fn constant_sample(value: f32, frames: usize, sample_rate: u32) -> Arc<SampleData> {
    Arc::new(SampleData::from_planar(vec![vec![value; frames]], sample_rate))
}

/// Builds a region from `(key, value)` pairs.
pub fn region(opcodes: &[(&str, &str)]) -> Region {
    Region::from_opcodes(
        opcodes
            .iter()
            .map(|(key, value)| Opcode::new(key, value))
            .collect(),
    )
}

/// An in-memory instrument where every region plays the same sample.
pub fn instrument(regions: &[&[(&str, &str)]], sample: Arc<SampleData>) -> Box<Instrument> {
    Box::new(Instrument::from_regions(
        regions
            .iter()
            .map(|opcodes| (region(opcodes), Arc::clone(&sample)))
            .collect(),
    ))
}
