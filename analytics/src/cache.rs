//! Directory-backed JSON stubs of stage outputs
//!
//! A stub is written once per stage and run key. When a stub exists it is
//! trusted as-is, so deleting the file is the only way to force recomputation.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub struct StageCache {
    dir: PathBuf,
}

impl StageCache {
    /// Open a cache directory, creating it when missing
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        log::debug!("Stage cache at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Stored value for `key`, or `None` when nothing was saved under it
    pub fn read_stub<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_reader(BufReader::new(file))?;
        log::debug!("Loaded stub {}", path.display());
        Ok(Some(value))
    }

    pub fn save_stub<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path_for(key);
        let file = fs::File::create(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
        log::debug!("Saved stub {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyticsError;

    #[test]
    fn test_missing_stub_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::open(dir.path()).unwrap();
        let stub: Option<Vec<u32>> = cache.read_stub("run.possession").unwrap();
        assert!(stub.is_none());
    }

    #[test]
    fn test_save_and_read_stub() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::open(dir.path().join("nested")).unwrap();
        let possession = vec![Some(3u32), None, Some(4)];

        cache.save_stub("run.possession", &possession).unwrap();
        assert!(cache.path_for("run.possession").exists());

        let loaded: Option<Vec<Option<u32>>> = cache.read_stub("run.possession").unwrap();
        assert_eq!(loaded, Some(possession));
    }

    #[test]
    fn test_corrupt_stub_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::open(dir.path()).unwrap();
        fs::write(cache.path_for("bad"), "{ not json").unwrap();

        let result: Result<Option<Vec<u32>>> = cache.read_stub("bad");
        assert!(matches!(result, Err(AnalyticsError::SerializationError(_))));
    }
}
