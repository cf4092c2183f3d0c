//! File-backed session store
//!
//! Stores each key as its own JSON file in a directory. Used as the
//! secondary store when the database is unreachable.

use std::fs;
use std::path::{Path, PathBuf};

use super::{SessionStore, StorageError};

/// One `<key>.json` file per stored key
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`
    ///
    /// Bytes outside `[A-Za-z0-9-]` are written as `_XX` hex escapes, `_`
    /// included. Distinct keys map to distinct files and no key can escape
    /// the store directory.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut file_name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                file_name.push(byte as char);
            } else {
                file_name.push_str(&format!("_{:02X}", byte));
            }
        }
        self.dir.join(format!("{}.json", file_name))
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    fn save(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.path_for(key);
        fs::write(&path, blob)?;
        tracing::debug!("Session state saved to {:?}", path);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_creates_directory() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("sessions"));

        store.save("queue:s-1", "[1,2,3]").unwrap();
        assert_eq!(store.load("queue:s-1").unwrap().as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn test_keys_are_sanitised() {
        let store = JsonFileStore::new("/tmp/viva-test");
        let path = store.path_for("queue:../../etc/passwd");
        assert_eq!(path.parent().unwrap(), Path::new("/tmp/viva-test"));
        assert!(path.ends_with("queue_3A_2E_2E_2F_2E_2E_2Fetc_2Fpasswd.json"));
    }

    #[test]
    fn test_similar_keys_use_separate_files() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert_ne!(store.path_for("queue:a.b"), store.path_for("queue:a_b"));

        store.save("queue:a.b", "session a.b").unwrap();
        store.save("queue:a_b", "session a_b").unwrap();
        assert_eq!(store.load("queue:a.b").unwrap().as_deref(), Some("session a.b"));
        assert_eq!(store.load("queue:a_b").unwrap().as_deref(), Some("session a_b"));
    }

    #[test]
    fn test_load_missing_and_remove_missing() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("nothing").unwrap().is_none());
        store.remove("nothing").unwrap();
    }
}
