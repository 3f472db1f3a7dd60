//! Shared fixtures for devmirror tests

use async_trait::async_trait;
use devmirror_types::{Error, LocalFilesystem, LocalStat, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// A timestamp `secs` seconds after the Unix epoch
pub fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

/// Modification time of a local path in whole Unix seconds
pub fn mtime_secs(path: &Path) -> i64 {
    let metadata = std::fs::metadata(path).expect("Failed to read metadata");
    filetime::FileTime::from_last_modification_time(&metadata).unix_seconds()
}

/// Write a local file and stamp it with the given modification time
pub fn write_with_mtime(path: &Path, content: &[u8], secs: i64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(path, content).expect("Failed to write test file");
    filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(secs, 0))
        .expect("Failed to set modification time");
}

/// Wraps a filesystem and injects failures for chosen paths
#[derive(Debug, Clone)]
pub struct FaultyFilesystem<F> {
    inner: F,
    failing_writes: HashSet<PathBuf>,
    failing_stats: HashSet<PathBuf>,
    failing_directories: HashSet<PathBuf>,
    failing_times: HashSet<PathBuf>,
}

impl<F> FaultyFilesystem<F> {
    /// Wrap `inner` without any injected failure
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            failing_writes: HashSet::new(),
            failing_stats: HashSet::new(),
            failing_directories: HashSet::new(),
            failing_times: HashSet::new(),
        }
    }

    /// Fail `create_file` for `path`
    pub fn fail_write<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.failing_writes.insert(path.into());
        self
    }

    /// Fail `stat` for `path` with a non-"not found" error
    pub fn fail_stat<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.failing_stats.insert(path.into());
        self
    }

    /// Fail `ensure_directory` for `path`
    pub fn fail_ensure_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.failing_directories.insert(path.into());
        self
    }

    /// Fail `set_times` for `path`
    pub fn fail_set_times<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.failing_times.insert(path.into());
        self
    }
}

#[async_trait]
impl<F: LocalFilesystem> LocalFilesystem for FaultyFilesystem<F> {
    type Writer = F::Writer;

    async fn stat(&self, path: &Path) -> Result<Option<LocalStat>> {
        if self.failing_stats.contains(path) {
            return Err(Error::metadata_query(path, "injected metadata failure"));
        }
        self.inner.stat(path).await
    }

    async fn ensure_directory(&self, path: &Path) -> Result<()> {
        if self.failing_directories.contains(path) {
            return Err(Error::local_io(path, "injected directory failure"));
        }
        self.inner.ensure_directory(path).await
    }

    async fn create_file(&self, path: &Path) -> Result<Self::Writer> {
        if self.failing_writes.contains(path) {
            return Err(Error::local_io(path, "injected write failure"));
        }
        self.inner.create_file(path).await
    }

    async fn set_times(
        &self,
        path: &Path,
        accessed: SystemTime,
        modified: SystemTime,
    ) -> Result<()> {
        if self.failing_times.contains(path) {
            return Err(Error::local_io(path, "injected timestamp failure"));
        }
        self.inner.set_times(path, accessed, modified).await
    }
}
