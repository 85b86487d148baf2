use crate::error::{RepoError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Metadata written into the lock marker by whoever holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub created: String,
}

impl LockOwner {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            created: Local::now().to_rfc3339(),
        }
    }

    pub fn describe(&self) -> String {
        let since = DateTime::parse_from_rfc3339(&self.created)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|_| self.created.clone());
        format!("process {} since {}", self.pid, since)
    }
}

/// Advisory lock guarding one repository directory. The marker is created
/// exclusively, so two processes racing for it cannot both win. A crashed
/// owner leaves the marker behind; only a forced acquire replaces it.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    held: Option<LockOwner>,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Returns the current owner recorded in the marker, if any.
    pub fn owner(&self) -> Option<LockOwner> {
        let content = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn acquire(&mut self, force: bool) -> Result<()> {
        if self.held.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let me = LockOwner::current();
        let content = serde_json::to_string(&me)?;
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                file.write_all(content.as_bytes())?;
                file.sync_all()?;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let owner = self.owner();
                if !force {
                    debug!("Lock {} already held by {:?}", self.path.display(), owner);
                    return Err(RepoError::LockContention {
                        path: self.path.clone(),
                        owner: owner.map(|o| o.describe()),
                    });
                }

                warn!(
                    "Overriding lock {} held by {}",
                    self.path.display(),
                    owner
                        .map(|o| o.describe())
                        .unwrap_or_else(|| "an unknown owner".to_string())
                );
                self.replace_marker(&content)
                    .map_err(|e| RepoError::LockFailure {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    })?;
            }
            Err(e) if force => {
                return Err(RepoError::LockFailure {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }

        self.held = Some(me);
        info!("Locked {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    /// Swaps a new marker in with a rename, so the marker is never truncated.
    fn replace_marker(&self, content: &str) -> std::io::Result<()> {
        let tmp = self.temp_path();
        fs::write(&tmp, content)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    pub fn release(&mut self) -> Result<()> {
        let Some(me) = self.held.take() else {
            return Ok(());
        };

        // Someone may have forced the lock away from us; leave theirs alone.
        if self.owner().as_ref() == Some(&me) {
            fs::remove_file(&self.path)?;
            info!("Released {}", self.path.display());
        }
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_lock_contends_until_forced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("lock");

        let mut first = LockFile::new(&path);
        first.acquire(false).unwrap();
        assert!(path.exists());
        assert_eq!(first.owner().unwrap().pid, std::process::id());

        let mut second = LockFile::new(&path);
        let err = second.acquire(false).unwrap_err();
        assert!(matches!(err, RepoError::LockContention { .. }));
        assert!(!second.is_held());

        second.acquire(true).unwrap();
        assert!(second.is_held());

        // The overridden holder must not delete the new owner's marker.
        drop(first);
        assert!(path.exists());
        drop(second);
        assert!(!path.exists());
    }

    #[test]
    fn reacquire_is_a_no_op_and_drop_removes_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");
        {
            let mut lock = LockFile::new(&path);
            lock.acquire(false).unwrap();
            lock.acquire(false).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn stale_marker_with_garbage_can_be_forced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");
        fs::write(&path, "not json").unwrap();

        let mut lock = LockFile::new(&path);
        match lock.acquire(false) {
            Err(RepoError::LockContention { owner, .. }) => assert!(owner.is_none()),
            other => panic!("unexpected {:?}", other),
        }
        lock.acquire(true).unwrap();
        assert_eq!(lock.owner().unwrap().pid, std::process::id());
    }

    #[test]
    fn forced_override_swaps_the_whole_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");
        fs::write(&path, "x".repeat(4096)).unwrap();

        let mut lock = LockFile::new(&path);
        lock.acquire(true).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let owner: LockOwner = serde_json::from_str(&content).unwrap();
        assert_eq!(owner.pid, std::process::id());
        assert!(!lock.temp_path().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_override_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        // A directory where the marker should be cannot be renamed over.
        let path = dir.path().join("lock");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "").unwrap();

        let mut lock = LockFile::new(&path);
        assert!(lock.acquire(true).is_err());
        assert!(!lock.temp_path().exists());
        assert!(!lock.is_held());
    }
}
