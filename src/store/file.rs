//! File-backed key-value store.
//!
//! One document per key under a state directory (default
//! `.cockpit/state/`). Writes go through a temp file followed by a rename
//! so a crash mid-write never leaves a half-written record for the
//! recovery coordinator to trip over.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::StoreError;
use crate::store::KeyValueStore;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|source| StoreError::Write {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys contain ':' separators; map them to filename-safe form.
        let name: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let write = fs::write(&tmp, value).and_then(|_| fs::rename(&tmp, &path));
        write.map_err(|source| StoreError::Write {
            key: key.to_string(),
            source,
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (FileStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_get_missing_key_returns_none() {
        let (store, _dir) = make_store();
        assert!(store.get("cockpit:demo:lock").unwrap().is_none());
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let (store, _dir) = make_store();
        store.set("cockpit:demo:lock", r#"{"status":"idle"}"#).unwrap();
        assert_eq!(
            store.get("cockpit:demo:lock").unwrap().as_deref(),
            Some(r#"{"status":"idle"}"#)
        );
    }

    #[test]
    fn test_set_overwrites_previous_value() {
        let (store, _dir) = make_store();
        store.set("k", "first").unwrap();
        store.set("k", "second").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (store, _dir) = make_store();
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
        store.remove("k").unwrap();
    }

    #[test]
    fn test_keys_do_not_collide_across_workspaces() {
        let (store, _dir) = make_store();
        store.set("cockpit:alpha:lock", "a").unwrap();
        store.set("cockpit:beta:lock", "b").unwrap();
        assert_eq!(store.get("cockpit:alpha:lock").unwrap().as_deref(), Some("a"));
        assert_eq!(store.get("cockpit:beta:lock").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set("cockpit:demo:pending", r#"{"kind":"plan"}"#).unwrap();
        }
        {
            let store = FileStore::open(dir.path()).unwrap();
            assert_eq!(
                store.get("cockpit:demo:pending").unwrap().as_deref(),
                Some(r#"{"kind":"plan"}"#)
            );
        }
    }
}
