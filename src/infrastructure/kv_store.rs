use crate::error::{RepoError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Durable string-to-string map backed by a JSON file.
///
/// The file is read on first access and rewritten (temp file + rename) after
/// every mutation. One mutex guards both the map and the write, so writers on
/// different threads are serialized and a reader never sees a half-applied
/// update.
#[derive(Debug)]
pub struct KeyedConfigStore {
    path: PathBuf,
    values: Mutex<Option<BTreeMap<String, String>>>,
}

impl KeyedConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let mut guard = self.loaded()?;
        Ok(values(&mut guard).get(key).cloned())
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        let mut guard = self.loaded()?;
        Ok(values(&mut guard).contains_key(key))
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.get(key)?.and_then(|v| v.trim().parse().ok()))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        Ok(matches!(self.get(key)?.as_deref(), Some("true") | Some("1")))
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut guard = self.loaded()?;
        Ok(values(&mut guard).keys().cloned().collect())
    }

    pub fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        let mut guard = self.loaded()?;
        Ok(values(&mut guard).clone())
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        let mut guard = self.loaded()?;
        let map = values(&mut guard);
        if map.get(key) == Some(&value) {
            return Ok(());
        }
        map.insert(key.to_string(), value);
        self.flush(map)
    }

    pub fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.set(key, value.to_string())
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, if value { "true" } else { "false" })
    }

    /// Applies several writes with a single flush.
    pub fn set_many<I, K, V>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut guard = self.loaded()?;
        let map = values(&mut guard);
        for (key, value) in pairs {
            map.insert(key.into(), value.into());
        }
        self.flush(map)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut guard = self.loaded()?;
        let map = values(&mut guard);
        if map.remove(key).is_none() {
            return Ok(false);
        }
        self.flush(map)?;
        Ok(true)
    }

    fn loaded(&self) -> Result<MutexGuard<'_, Option<BTreeMap<String, String>>>> {
        let mut guard = self
            .values
            .lock()
            .map_err(|_| RepoError::Other(format!("{} store poisoned", self.path.display())))?;
        if guard.is_none() {
            *guard = Some(self.read_file()?);
        }
        Ok(guard)
    }

    fn read_file(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&content) {
            Ok(map) => {
                debug!("Loaded {}", self.path.display());
                Ok(map)
            }
            Err(e) => {
                // Keep the unreadable file around for inspection, start empty.
                let backup = self.path.with_extension("json.corrupt");
                warn!(
                    "Failed to parse {}: {}. Moving it to {}",
                    self.path.display(),
                    e,
                    backup.display()
                );
                fs::rename(&self.path, &backup)?;
                Ok(BTreeMap::new())
            }
        }
    }

    fn flush(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn values<'a>(
    guard: &'a mut MutexGuard<'_, Option<BTreeMap<String, String>>>,
) -> &'a mut BTreeMap<String, String> {
    guard.get_or_insert_with(BTreeMap::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn writes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let store = KeyedConfigStore::new(&path);
        assert_eq!(store.get("missing").unwrap(), None);
        store.set("name", "value").unwrap();
        store.set_int("count", 42).unwrap();
        store.set("name", "other").unwrap();

        let reopened = KeyedConfigStore::new(&path);
        assert_eq!(reopened.get("name").unwrap().as_deref(), Some("other"));
        assert_eq!(reopened.get_int("count").unwrap(), Some(42));
        assert_eq!(reopened.keys().unwrap(), vec!["count", "name"]);
    }

    #[test]
    fn loading_is_lazy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lazy.json");

        let store = KeyedConfigStore::new(&path);
        assert!(!path.exists());
        fs::write(&path, r#"{"late": "yes"}"#).unwrap();
        assert_eq!(store.get("late").unwrap().as_deref(), Some("yes"));
    }

    #[test]
    fn corrupt_file_is_set_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();

        let store = KeyedConfigStore::new(&path);
        assert!(!store.has("anything").unwrap());
        assert!(dir.path().join("bad.json.corrupt").exists());

        store.set_bool("fresh", true).unwrap();
        assert!(KeyedConfigStore::new(&path).get_bool("fresh").unwrap());
    }

    #[test]
    fn remove_reports_presence() {
        let dir = TempDir::new().unwrap();
        let store = KeyedConfigStore::new(dir.path().join("r.json"));
        store.set_many([("a", "1"), ("b", "2")]).unwrap();
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert_eq!(store.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.json");
        let store = Arc::new(KeyedConfigStore::new(&path));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        store.set(&format!("t{}-{}", t, i), i.to_string()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(KeyedConfigStore::new(&path).keys().unwrap().len(), 100);
    }
}
