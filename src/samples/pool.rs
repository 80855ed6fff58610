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

//! Caching of decoded sample files.
//!
//! Files are decoded entirely into memory, `preload_size` frames per decode step. The cache is keyed by path and invalidated when
//! the file's modification time changes, so an instrument reload picks up edited samples
//! without decoding unchanged ones again.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info};

use super::decode::decode_file;
use super::error::SampleError;
use super::resample::upsample;
use super::{Oversampling, SampleData};

/// Default number of frames decoded per step.
pub const DEFAULT_PRELOAD_SIZE: u32 = 8192;
pub const MIN_PRELOAD_SIZE: u32 = 1024;
pub const MAX_PRELOAD_SIZE: u32 = 1 << 20;

struct CachedFile {
    modified: Option<SystemTime>,
    data: Arc<SampleData>,
}

/// Loads and caches sample files.
pub struct FilePool {
    cache: HashMap<PathBuf, CachedFile>,
    preload_size: u32,
    oversampling: Oversampling,
}

impl FilePool {
    /// Creates an empty pool. The preload size is clamped into the supported range.
    pub fn new(preload_size: u32, oversampling: Oversampling) -> FilePool {
        FilePool {
            cache: HashMap::new(),
            preload_size: preload_size.clamp(MIN_PRELOAD_SIZE, MAX_PRELOAD_SIZE),
            oversampling,
        }
    }

    /// Loads a sample file, returning the cached copy if the file is unchanged.
    pub fn load(&mut self, path: &Path) -> Result<Arc<SampleData>, SampleError> {
        let modified = fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .ok();

        if let Some(cached) = self.cache.get(path) {
            if cached.modified == modified {
                debug!(path = ?path, "Using cached sample");
                return Ok(Arc::clone(&cached.data));
            }
        }

        info!(path = ?path, oversampling = %self.oversampling, "Loading sample into memory");
        let decoded = decode_file(path, self.preload_size as usize)?;
        let data = Arc::new(upsample(&decoded, self.oversampling.factor(), path)?);

        info!(
            path = ?path,
            channels = data.channel_count(),
            sample_rate = data.sample_rate(),
            frames = data.frames(),
            memory_kb = data.memory_size() / 1024,
            "Sample loaded"
        );

        self.cache.insert(
            path.to_path_buf(),
            CachedFile {
                modified,
                data: Arc::clone(&data),
            },
        );
        Ok(data)
    }

    /// Sets the number of frames decoded per step for files loaded from now on. Cached files
    /// keep their data, and every file is still held in memory in full. Values are clamped
    /// into the supported range; read back [`FilePool::preload_size`] to see what was applied.
    pub fn set_preload_size(&mut self, preload_size: u32) {
        self.preload_size = preload_size.clamp(MIN_PRELOAD_SIZE, MAX_PRELOAD_SIZE);
    }

    pub fn preload_size(&self) -> u32 {
        self.preload_size
    }

    /// Changes the oversampling factor. Cached data was decoded with the previous factor and
    /// is dropped.
    pub fn set_oversampling(&mut self, oversampling: Oversampling) {
        if oversampling != self.oversampling {
            self.oversampling = oversampling;
            self.cache.clear();
        }
    }

    pub fn oversampling(&self) -> Oversampling {
        self.oversampling
    }

    /// Drops every cached file that is not shared with a live instrument.
    pub fn collect_unused(&mut self) {
        self.cache
            .retain(|_, cached| Arc::strong_count(&cached.data) > 1);
    }

    pub fn cached_files(&self) -> usize {
        self.cache.len()
    }

    /// Returns the total memory used by cached samples.
    pub fn total_memory_usage(&self) -> usize {
        self.cache
            .values()
            .map(|cached| cached.data.memory_size())
            .sum()
    }
}

impl std::fmt::Debug for FilePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePool")
            .field("cached_files", &self.cache.len())
            .field("preload_size", &self.preload_size)
            .field("oversampling", &self.oversampling)
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_cache_and_invalidation() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("one.wav");
        write_wav(&path, &[vec![0.1f32, 0.2, 0.3]], 44100).unwrap();

        let mut pool = FilePool::new(DEFAULT_PRELOAD_SIZE, Oversampling::X1);
        let first = pool.load(&path).unwrap();
        let second = pool.load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.cached_files(), 1);

        pool.set_oversampling(Oversampling::X2);
        assert_eq!(pool.cached_files(), 0);
        let third = pool.load(&path).unwrap();
        assert_eq!(third.sample_rate(), 88200);
        assert_eq!(third.frames(), 6);
    }

    #[test]
    fn test_collect_unused() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("one.wav");
        write_wav(&path, &[vec![0.1f32, 0.2, 0.3]], 44100).unwrap();

        let mut pool = FilePool::new(DEFAULT_PRELOAD_SIZE, Oversampling::X1);
        let data = pool.load(&path).unwrap();
        pool.collect_unused();
        assert_eq!(pool.cached_files(), 1);
        drop(data);
        pool.collect_unused();
        assert_eq!(pool.cached_files(), 0);
        assert_eq!(pool.total_memory_usage(), 0);
    }

    #[test]
    fn test_preload_size_is_clamped() {
        let mut pool = FilePool::new(0, Oversampling::X1);
        assert_eq!(pool.preload_size(), MIN_PRELOAD_SIZE);
        pool.set_preload_size(16384);
        assert_eq!(pool.preload_size(), 16384);
        pool.set_preload_size(u32::MAX);
        assert_eq!(pool.preload_size(), MAX_PRELOAD_SIZE);
    }
}
