use super::{LocalCache, validate_key};
use crate::core::{Result, StoreError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One JSON file per key inside a directory.
///
/// Writes go to a temp file in the same directory and are renamed over the
/// target, so readers see either the old or the new snapshot, never a torn one.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::CacheWrite(format!(
                "Failed to create cache directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl LocalCache for FileCache {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        validate_key(key)?;
        let mut temp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| StoreError::CacheWrite(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(bytes)
            .map_err(|e| StoreError::CacheWrite(format!("Failed to write {}: {}", key, e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| StoreError::CacheWrite(format!("Failed to sync {}: {}", key, e)))?;
        temp.persist(self.path_for(key))
            .map_err(|e| StoreError::CacheWrite(format!("Failed to rename {}: {}", key, e.error)))?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::CacheRead(format!("Failed to read {}: {}", key, e))),
        }
    }

    fn erase(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::CacheWrite(format!("Failed to erase {}: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_read_erase() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::open(temp_dir.path().join("cache")).unwrap();

        assert_eq!(cache.read("counter").unwrap(), None);
        cache.write("counter", b"{\"value\":1}").unwrap();
        assert_eq!(cache.read("counter").unwrap().unwrap(), b"{\"value\":1}");
        assert!(cache.path_for("counter").exists());

        cache.write("counter", b"{\"value\":2}").unwrap();
        assert_eq!(cache.read("counter").unwrap().unwrap(), b"{\"value\":2}");

        cache.erase("counter").unwrap();
        cache.erase("counter").unwrap();
        assert_eq!(cache.read("counter").unwrap(), None);
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::open(temp_dir.path()).unwrap();
        cache.write("counter", b"{}").unwrap();
        cache.write("session", b"{}").unwrap();

        let mut names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["counter.json", "session.json"]);
    }

    #[test]
    fn rejects_path_like_keys() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::open(temp_dir.path()).unwrap();
        assert!(matches!(
            cache.write("../escape", b"{}"),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
