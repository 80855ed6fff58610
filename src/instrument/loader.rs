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

//! Blocking instrument loading. Only ever used at startup or from the worker thread.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::LoadError;
use super::reader::{parse_document, Header};
use super::{Instrument, ModificationMarker};
use crate::opcode::Opcode;
use crate::region::Region;
use crate::samples::{FilePool, Oversampling};

/// Builds instruments from files, sharing decoded samples between loads.
#[derive(Debug)]
pub struct InstrumentLoader {
    pool: FilePool,
}

impl InstrumentLoader {
    pub fn new(pool: FilePool) -> InstrumentLoader {
        InstrumentLoader { pool }
    }

    /// Loads an instrument file and all of the samples it references. Regions whose sample
    /// cannot be loaded are skipped and reported through [`Instrument::missing_samples`].
    pub fn load_file(&mut self, path: &Path) -> Result<Instrument, LoadError> {
        info!(path = ?path, "Loading instrument");

        // Taken before reading so an edit during the load is seen by the next check.
        let marker = ModificationMarker::current(Arc::from(path));
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = parse_document(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            line: e.line,
            col: e.col,
            message: e.message,
        })?;

        let base_dir = path.parent().unwrap_or(Path::new(""));
        let mut instrument = Instrument::empty();
        let mut default_path = String::new();
        let mut global: Vec<Opcode> = Vec::new();
        let mut master: Vec<Opcode> = Vec::new();
        let mut group: Vec<Opcode> = Vec::new();
        let mut num_masters = 0;
        let mut num_groups = 0;

        for directive in document.directives.iter() {
            instrument.add_unknown_opcode(directive);
        }

        for section in document.sections {
            match section.header {
                Header::Control => {
                    for opcode in section.opcodes {
                        if opcode.name == "default_path" && opcode.parameter.is_none() {
                            default_path = opcode.value.replace('\\', "/");
                        } else {
                            instrument.add_unknown_opcode(&opcode.name);
                        }
                    }
                }
                Header::Global => {
                    global = section.opcodes;
                    master.clear();
                    group.clear();
                }
                Header::Master => {
                    num_masters += 1;
                    master = section.opcodes;
                    group.clear();
                }
                Header::Group => {
                    num_groups += 1;
                    group = section.opcodes;
                }
                Header::Region => {
                    let opcodes: Vec<Opcode> = global
                        .iter()
                        .chain(master.iter())
                        .chain(group.iter())
                        .cloned()
                        .chain(section.opcodes)
                        .collect();
                    let region = Region::from_opcodes(opcodes);
                    self.add_region(&mut instrument, region, base_dir, &default_path);
                }
                Header::Unsupported(name) => {
                    debug!(header = %name, "Skipping unsupported header");
                    instrument.add_unknown_opcode(&format!("<{}>", name));
                }
                Header::None => {
                    for opcode in section.opcodes {
                        instrument.add_unknown_opcode(&opcode.name);
                    }
                }
            }
        }

        instrument.set_counts(num_masters, num_groups);
        instrument.set_marker(marker);
        self.pool.collect_unused();

        info!(
            path = ?path,
            regions = instrument.num_regions(),
            masters = num_masters,
            groups = num_groups,
            unknown_opcodes = instrument.unknown_opcodes().len(),
            missing_samples = instrument.missing_samples().len(),
            memory_kb = self.pool.total_memory_usage() / 1024,
            "Instrument loaded"
        );

        Ok(instrument)
    }

    fn add_region(
        &mut self,
        instrument: &mut Instrument,
        region: Region,
        base_dir: &Path,
        default_path: &str,
    ) {
        if region.sample().is_empty() {
            warn!("Skipping region without a sample");
            instrument.add_missing_sample("");
            return;
        }

        let sample_path = resolve_sample_path(base_dir, default_path, region.sample());
        match self.pool.load(&sample_path) {
            Ok(data) => instrument.push_region(region, data),
            Err(e) => {
                warn!(path = ?sample_path, error = %e, "Failed to load sample, skipping region");
                instrument.add_missing_sample(region.sample());
            }
        }
    }

    pub fn set_preload_size(&mut self, preload_size: u32) {
        self.pool.set_preload_size(preload_size);
    }

    pub fn preload_size(&self) -> u32 {
        self.pool.preload_size()
    }

    /// Changes the oversampling factor used for subsequent loads.
    pub fn set_oversampling(&mut self, oversampling: Oversampling) {
        self.pool.set_oversampling(oversampling);
    }

    pub fn oversampling(&self) -> Oversampling {
        self.pool.oversampling()
    }

    /// Drops cached samples that no live instrument uses anymore.
    pub fn collect_unused(&mut self) {
        self.pool.collect_unused();
    }

    pub fn cached_files(&self) -> usize {
        self.pool.cached_files()
    }

    pub fn memory_usage(&self) -> usize {
        self.pool.total_memory_usage()
    }
}

fn resolve_sample_path(base_dir: &Path, default_path: &str, sample: &str) -> PathBuf {
    let relative = PathBuf::from(format!("{}{}", default_path, sample));
    if relative.is_absolute() {
        relative
    } else {
        base_dir.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::DEFAULT_PRELOAD_SIZE;
    use crate::testutil::{write_sfz, write_wav};

    fn loader() -> InstrumentLoader {
        InstrumentLoader::new(FilePool::new(DEFAULT_PRELOAD_SIZE, Oversampling::X1))
    }

    #[test]
    fn test_load_with_inheritance() {
        let tempdir = tempfile::tempdir().unwrap();
        std::fs::create_dir(tempdir.path().join("samples")).unwrap();
        write_wav(
            &tempdir.path().join("samples").join("kick.wav"),
            &[vec![0.5f32; 16]],
            48000,
        )
        .unwrap();

        let path = write_sfz(
            tempdir.path(),
            "kit.sfz",
            r#"
            <control> default_path=samples/
            <global> volume=-6 amp_veltrack=0
            <master> pan=20
            <group> lokey=36 hikey=40
            <region> sample=kick.wav
            <region> sample=kick.wav volume=0 fil_type=lpf_2p
            <group> key=50
            <region> sample=kick.wav
            "#,
        );

        let mut loader = loader();
        let instrument = loader.load_file(&path).unwrap();
        assert_eq!(instrument.num_regions(), 3);
        assert_eq!(instrument.num_masters(), 1);
        assert_eq!(instrument.num_groups(), 2);
        assert_eq!(instrument.unknown_opcodes(), &["fil_type"]);
        assert!(instrument.missing_samples().is_empty());

        let regions = instrument.regions();
        assert_eq!(regions[0].key_range(), &(36..=40));
        assert!((regions[0].gain(1) - 0.5012).abs() < 1e-3);
        assert!((regions[1].gain(1) - 1.0).abs() < 1e-6);
        assert_eq!(regions[2].key_range(), &(50..=50));
        assert!(regions[2].pan_gains().1 > 1.0);

        // The same file is shared between regions.
        assert_eq!(instrument.sample(0), instrument.sample(2));
        assert_eq!(instrument.source().map(|p| &**p), Some(path.as_path()));
        assert!(!instrument.should_reload_file());
    }

    #[test]
    fn test_missing_samples_are_skipped() {
        let tempdir = tempfile::tempdir().unwrap();
        write_wav(&tempdir.path().join("a.wav"), &[vec![0.1f32; 4]], 48000).unwrap();
        let path = write_sfz(
            tempdir.path(),
            "inst.sfz",
            "<region> sample=a.wav\n<region> sample=missing.wav\n<region> key=60\n",
        );

        let instrument = loader().load_file(&path).unwrap();
        assert_eq!(instrument.num_regions(), 1);
        assert_eq!(instrument.missing_samples(), &["missing.wav", ""]);
    }

    #[test]
    fn test_global_resets_master_and_group() {
        let tempdir = tempfile::tempdir().unwrap();
        write_wav(&tempdir.path().join("a.wav"), &[vec![0.1f32; 4]], 48000).unwrap();
        let path = write_sfz(
            tempdir.path(),
            "inst.sfz",
            "<group> lokey=10\n<global>\n<region> sample=a.wav\n",
        );

        let instrument = loader().load_file(&path).unwrap();
        assert_eq!(instrument.regions()[0].key_range(), &(0..=127));
    }

    #[test]
    fn test_unsupported_constructs_are_reported() {
        let tempdir = tempfile::tempdir().unwrap();
        write_wav(&tempdir.path().join("a.wav"), &[vec![0.1f32; 4]], 48000).unwrap();
        let path = write_sfz(
            tempdir.path(),
            "inst.sfz",
            "#define $X 1\n<control> set_cc1=64\n<curve> v000=0\n<region> sample=a.wav\n",
        );

        let instrument = loader().load_file(&path).unwrap();
        assert_eq!(instrument.num_regions(), 1);
        assert_eq!(
            instrument.unknown_opcodes(),
            &["#define", "set_cc", "<curve>"]
        );
    }

    #[test]
    fn test_missing_file() {
        let result = loader().load_file(Path::new("/nonexistent/instrument.sfz"));
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_syntax_error() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = write_sfz(tempdir.path(), "bad.sfz", "<region>\n<regi");
        match loader().load_file(&path) {
            Err(LoadError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_oversampling_applies_to_loads() {
        let tempdir = tempfile::tempdir().unwrap();
        write_wav(&tempdir.path().join("a.wav"), &[vec![0.1f32; 4]], 48000).unwrap();
        let path = write_sfz(tempdir.path(), "inst.sfz", "<region> sample=a.wav");

        let mut loader = loader();
        loader.set_oversampling(Oversampling::X4);
        assert_eq!(loader.oversampling(), Oversampling::X4);
        let instrument = loader.load_file(&path).unwrap();
        let sample = instrument.sample(0).unwrap();
        assert_eq!(sample.sample_rate(), 192000);
        assert_eq!(sample.frames(), 16);
    }
}
