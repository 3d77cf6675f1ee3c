//! Directory-backed storage substrate
//!
//! One file per key. File names are the hex-encoded key, so keys can be
//! enumerated from the directory listing alone and driver names with
//! spaces or slashes stay safe on disk.

use super::storage::Storage;
use crate::error::{PitwallError, PitwallResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const ENTRY_EXTENSION: &str = "entry";

/// Substrate that persists each key as a file in a directory
#[derive(Debug, Clone)]
pub struct DirStorage {
    dir: PathBuf,
}

impl DirStorage {
    /// Open (and create if needed) a storage directory
    pub fn open(dir: impl Into<PathBuf>) -> PitwallResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            PitwallError::storage(format!("creating cache directory {}", dir.display()), e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(&dir, perms)
                .map_err(|e| PitwallError::storage("setting cache directory permissions", e))?;
        }

        Ok(Self { dir })
    }

    /// Directory holding the entries
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", hex::encode(key), ENTRY_EXTENSION))
    }

    fn decode_key(path: &Path) -> Option<String> {
        if path.extension().is_none_or(|ext| ext != ENTRY_EXTENSION) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

impl Storage for DirStorage {
    fn get(&self, key: &str) -> PitwallResult<Option<String>> {
        let path = self.entry_path(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PitwallError::storage(
                format!("reading cache entry {}", path.display()),
                e,
            )),
        }
    }

    fn set(&self, key: &str, value: &str) -> PitwallResult<()> {
        let path = self.entry_path(key);
        let tmp = path.with_extension(format!("{}.tmp", ENTRY_EXTENSION));

        // Write-then-rename so readers see either the old or the new payload
        fs::write(&tmp, value).map_err(|e| {
            PitwallError::storage(format!("writing cache entry {}", tmp.display()), e)
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            PitwallError::storage(format!("committing cache entry {}", path.display()), e)
        })?;

        debug!("Stored {} bytes for key {}", value.len(), key);
        Ok(())
    }

    fn remove(&self, key: &str) -> PitwallResult<()> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PitwallError::storage(
                format!("removing cache entry {}", path.display()),
                e,
            )),
        }
    }

    fn keys(&self) -> PitwallResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| PitwallError::storage("reading cache directory", e))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PitwallError::storage("reading cache entry", e))?;
            if let Some(key) = Self::decode_key(&entry.path()) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "dir"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_storage() -> (DirStorage, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = DirStorage::open(temp.path().join("cache")).unwrap();
        (storage, temp)
    }

    #[test]
    fn dir_set_and_get() {
        let (storage, _temp) = test_storage();
        storage.set("pitwall:driver:Max Verstappen", "{}").unwrap();

        assert_eq!(
            storage.get("pitwall:driver:Max Verstappen").unwrap().as_deref(),
            Some("{}")
        );
        assert!(storage.get("missing").unwrap().is_none());
    }

    #[test]
    fn dir_keys_roundtrip_awkward_names() {
        let (storage, _temp) = test_storage();
        storage.set("a/b c", "1").unwrap();
        storage.set("ümlaut", "2").unwrap();

        let keys = storage.keys().unwrap();
        assert_eq!(keys, vec!["a/b c", "ümlaut"]);
    }

    #[test]
    fn dir_keys_ignore_foreign_files() {
        let (storage, _temp) = test_storage();
        fs::write(storage.path().join("README"), "not an entry").unwrap();
        fs::write(storage.path().join("zz.entry"), "bad hex").unwrap();
        storage.set("real", "1").unwrap();

        assert_eq!(storage.keys().unwrap(), vec!["real"]);
    }

    #[test]
    fn dir_remove_missing_is_noop() {
        let (storage, _temp) = test_storage();
        storage.remove("never-written").unwrap();

        storage.set("k", "v").unwrap();
        storage.remove("k").unwrap();
        assert!(storage.get("k").unwrap().is_none());
        assert!(storage.keys().unwrap().is_empty());
    }
}
