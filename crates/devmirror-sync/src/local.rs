//! Local destination filesystem backed by tokio

use async_trait::async_trait;
use devmirror_types::{Error, LocalFilesystem, LocalStat, Result};
use filetime::FileTime;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;
use tokio::fs::{self, File};
use tokio::io::BufWriter;

/// Default capacity of the write buffer used for destination files
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// [`LocalFilesystem`] implementation over `tokio::fs` and `filetime`
#[derive(Debug, Clone)]
pub struct TokioFilesystem {
    write_buffer_size: usize,
}

impl TokioFilesystem {
    /// Create a filesystem using `write_buffer_size` bytes of write buffering
    pub fn new(write_buffer_size: usize) -> Self {
        Self { write_buffer_size }
    }
}

impl Default for TokioFilesystem {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_BUFFER_SIZE)
    }
}

#[async_trait]
impl LocalFilesystem for TokioFilesystem {
    type Writer = BufWriter<File>;

    async fn stat(&self, path: &Path) -> Result<Option<LocalStat>> {
        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::metadata_query(path, e)),
        };

        let modified = metadata
            .modified()
            .map_err(|e| Error::metadata_query(path, e))?;

        Ok(Some(LocalStat {
            size: metadata.len(),
            modified,
        }))
    }

    async fn ensure_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(|e| {
            Error::local_io(path, format!("Failed to create directory: {}", e))
        })
    }

    async fn create_file(&self, path: &Path) -> Result<Self::Writer> {
        let file = File::create(path)
            .await
            .map_err(|e| Error::local_io(path, format!("Failed to create file: {}", e)))?;
        Ok(BufWriter::with_capacity(self.write_buffer_size, file))
    }

    async fn set_times(
        &self,
        path: &Path,
        accessed: SystemTime,
        modified: SystemTime,
    ) -> Result<()> {
        filetime::set_file_times(
            path,
            FileTime::from_system_time(accessed),
            FileTime::from_system_time(modified),
        )
        .map_err(|e| Error::local_io(path, format!("Failed to set modification time: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devmirror_tests::{at, mtime_secs};
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_stat_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let fs = TokioFilesystem::default();
        let stat = fs.stat(&temp_dir.path().join("missing")).await.unwrap();
        assert!(stat.is_none());
    }

    #[tokio::test]
    async fn test_write_and_set_times() {
        let temp_dir = TempDir::new().unwrap();
        let fs = TokioFilesystem::new(16);
        let dir = temp_dir.path().join("a").join("b");
        let path = dir.join("file.txt");

        fs.ensure_directory(&dir).await.unwrap();
        fs.ensure_directory(&dir).await.unwrap();

        let mut writer = fs.create_file(&path).await.unwrap();
        writer.write_all(b"hello world, buffered").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        fs.set_times(&path, at(1000), at(1000)).await.unwrap();

        let stat = fs.stat(&path).await.unwrap().unwrap();
        assert_eq!(stat.size, 21);
        assert_eq!(mtime_secs(&path), 1000);
    }

    #[tokio::test]
    async fn test_create_file_in_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let fs = TokioFilesystem::default();
        let result = fs.create_file(&temp_dir.path().join("nope").join("x")).await;
        assert!(matches!(result, Err(Error::LocalIo { .. })));
    }
}
