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

//! Instruments: the set of regions the synth plays from, along with their sample data.
//!
//! An instrument is built once on the worker thread and handed to the render thread whole.
//! Voices refer to regions by index, so replacing the instrument never leaves a voice
//! pointing at freed data.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::region::Region;
use crate::samples::SampleData;

mod error;
mod loader;
mod reader;

pub use error::LoadError;
pub use loader::InstrumentLoader;
pub use reader::{parse_document, Document, Header, Section, SyntaxError};

/// Identifies the file an instrument was loaded from and its modification time at load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationMarker {
    pub path: Arc<Path>,
    pub modified: Option<SystemTime>,
}

impl ModificationMarker {
    /// Reads the current modification time of the given file.
    pub fn current(path: Arc<Path>) -> ModificationMarker {
        let modified = file_modified(&path);
        ModificationMarker { path, modified }
    }

    /// True if the file on disk no longer matches this marker.
    pub fn is_stale(&self) -> bool {
        file_modified(&self.path) != self.modified
    }
}

fn file_modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
}

/// A playable instrument.
#[derive(Debug, Default)]
pub struct Instrument {
    regions: Vec<Region>,
    /// Sample data for each region, in region order.
    samples: Vec<Arc<SampleData>>,
    num_masters: usize,
    num_groups: usize,
    unknown_opcodes: Vec<String>,
    missing_samples: Vec<String>,
    marker: Option<ModificationMarker>,
}

impl Instrument {
    /// An instrument with no regions.
    pub fn empty() -> Instrument {
        Instrument::default()
    }

    /// Builds an instrument directly from regions and their sample data.
    pub fn from_regions(regions: Vec<(Region, Arc<SampleData>)>) -> Instrument {
        let mut instrument = Instrument::default();
        for (region, sample) in regions {
            instrument.push_region(region, sample);
        }
        instrument
    }

    pub(crate) fn push_region(&mut self, region: Region, sample: Arc<SampleData>) {
        for name in region.unknown_opcodes() {
            self.add_unknown_opcode(name);
        }
        self.regions.push(region);
        self.samples.push(sample);
    }

    pub(crate) fn add_unknown_opcode(&mut self, name: &str) {
        if !self.unknown_opcodes.iter().any(|known| known == name) {
            self.unknown_opcodes.push(name.to_string());
        }
    }

    pub(crate) fn add_missing_sample(&mut self, sample: &str) {
        self.missing_samples.push(sample.to_string());
    }

    pub(crate) fn set_counts(&mut self, num_masters: usize, num_groups: usize) {
        self.num_masters = num_masters;
        self.num_groups = num_groups;
    }

    pub(crate) fn set_marker(&mut self, marker: ModificationMarker) {
        self.marker = Some(marker);
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Sample data for the region at the given index.
    pub fn sample(&self, region: usize) -> Option<&SampleData> {
        self.samples.get(region).map(|sample| sample.as_ref())
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn num_masters(&self) -> usize {
        self.num_masters
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Opcodes and headers that were not understood, in the order first seen.
    pub fn unknown_opcodes(&self) -> &[String] {
        &self.unknown_opcodes
    }

    /// Sample references whose files could not be loaded. Their regions were skipped.
    pub fn missing_samples(&self) -> &[String] {
        &self.missing_samples
    }

    /// The file this instrument was loaded from, if any.
    pub fn source(&self) -> Option<&Arc<Path>> {
        self.marker.as_ref().map(|marker| &marker.path)
    }

    pub fn marker(&self) -> Option<&ModificationMarker> {
        self.marker.as_ref()
    }

    /// True if the backing file changed on disk since it was loaded. This touches the file
    /// system and must not be called from the render thread.
    pub fn should_reload_file(&self) -> bool {
        self.marker.as_ref().is_some_and(ModificationMarker::is_stale)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::opcode::Opcode;

    #[test]
    fn test_from_regions() {
        let data = Arc::new(SampleData::from_planar(vec![vec![0.0; 4]], 48000));
        let region = Region::from_opcodes(vec![
            Opcode::new("sample", "a.wav"),
            Opcode::new("cutoff", "100"),
        ]);
        let instrument =
            Instrument::from_regions(vec![(region.clone(), data.clone()), (region, data)]);
        assert_eq!(instrument.num_regions(), 2);
        assert_eq!(instrument.unknown_opcodes(), &["cutoff"]);
        assert_eq!(instrument.sample(1).map(SampleData::frames), Some(4));
        assert!(instrument.sample(2).is_none());
        assert!(instrument.source().is_none());
        assert!(!instrument.should_reload_file());
    }

    #[test]
    fn test_modification_marker() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("inst.sfz");
        fs::write(&path, "<region> sample=a.wav").unwrap();

        let marker = ModificationMarker::current(Arc::from(path.as_path()));
        assert!(marker.modified.is_some());
        assert!(!marker.is_stale());

        let later = SystemTime::now() + Duration::from_secs(10);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert!(marker.is_stale());

        fs::remove_file(&path).unwrap();
        assert!(marker.is_stale());
    }
}
