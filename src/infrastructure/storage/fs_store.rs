use crate::domain::storage::{Storage, StorageKeys};
use crate::domain::{CatalogFile, CatalogHeader, StagedBuild, CATALOG_SCHEMA};
use crate::error::{LoadError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Clone)]
pub struct FileSystemStore {
    data_dir: PathBuf,
}

impl FileSystemStore {
    /// `data_dir` is the repository's internal directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(StorageKeys::CATALOG)
    }

    fn app_dir(&self) -> PathBuf {
        self.data_dir.join(StorageKeys::APP_DIR)
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Writes next to the target and renames over it, so readers see either
    /// the old file or the new one.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn read_json_file<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            Ok(Some(serde_json::from_str(&content)?))
        } else {
            Ok(None)
        }
    }
}

/// Parses catalog bytes and checks the schema before anything touches disk.
pub fn parse_catalog(bytes: &[u8]) -> std::result::Result<CatalogFile, LoadError> {
    let header: CatalogHeader =
        serde_json::from_slice(bytes).map_err(|e| LoadError::Corrupt(e.to_string()))?;
    if header.schema != CATALOG_SCHEMA {
        return Err(LoadError::SchemaIncompatible {
            found: header.schema,
            expected: CATALOG_SCHEMA,
        });
    }
    serde_json::from_slice(bytes).map_err(|e| LoadError::Corrupt(e.to_string()))
}

impl Storage for FileSystemStore {
    fn load_catalog(&self) -> std::result::Result<CatalogFile, LoadError> {
        let path = self.catalog_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(LoadError::Missing(path)),
            Err(e) => return Err(e.into()),
        };
        parse_catalog(&bytes)
    }

    fn load_catalog_header(&self) -> Option<CatalogHeader> {
        let bytes = fs::read(self.catalog_path()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn save_catalog_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.write_atomic(&self.catalog_path(), bytes)?;
        info!("Catalog cache replaced");
        Ok(())
    }

    fn load_staged_build(&self) -> Result<Option<StagedBuild>> {
        self.read_json_file(&self.app_dir().join(StorageKeys::STAGED_BUILD))
    }

    fn save_staged_build(&self, build: &StagedBuild, exe_bytes: &[u8]) -> Result<()> {
        let exe_path = self.staged_exe_path(build);
        self.write_atomic(&exe_path, exe_bytes)?;
        mark_executable(&exe_path)?;

        // The pointer goes last: a build is only visible once fully written.
        let pointer = serde_json::to_vec_pretty(build)?;
        self.write_atomic(&self.app_dir().join(StorageKeys::STAGED_BUILD), &pointer)?;
        info!("Staged application build {}", build.version);
        Ok(())
    }

    fn staged_exe_path(&self, build: &StagedBuild) -> PathBuf {
        self.app_dir().join(&build.version).join(&build.exe)
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CatalogEntry;
    use tempfile::TempDir;

    fn catalog_bytes(schema: u32) -> Vec<u8> {
        let mut file = CatalogFile::new("1", vec![CatalogEntry::new("a", "A", "a", 1)]);
        file.schema = schema;
        serde_json::to_vec(&file).unwrap()
    }

    #[test]
    fn missing_corrupt_and_old_schema_are_distinct() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemStore::new(dir.path());

        assert!(matches!(store.load_catalog(), Err(LoadError::Missing(_))));

        fs::write(store.catalog_path(), b"{\"schema\":").unwrap();
        assert!(matches!(store.load_catalog(), Err(LoadError::Corrupt(_))));

        fs::write(store.catalog_path(), catalog_bytes(1)).unwrap();
        assert!(matches!(
            store.load_catalog(),
            Err(LoadError::SchemaIncompatible { found: 1, expected: CATALOG_SCHEMA })
        ));
    }

    #[test]
    fn atomic_write_leaves_no_part_file() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemStore::new(dir.path().join("data"));
        store.save_catalog_bytes(&catalog_bytes(CATALOG_SCHEMA)).unwrap();

        assert_eq!(store.load_catalog().unwrap().entries.len(), 1);
        assert_eq!(store.load_catalog_header().unwrap().version, "1");
        assert!(!dir.path().join("data").join("catalog.json.part").exists());
    }

    #[test]
    fn staged_build_pointer_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileSystemStore::new(dir.path());
        assert_eq!(store.load_staged_build().unwrap(), None);

        let build = StagedBuild {
            version: "2.0.0".to_string(),
            exe: "gamerepo".to_string(),
        };
        store.save_staged_build(&build, b"binary").unwrap();
        assert_eq!(store.load_staged_build().unwrap(), Some(build.clone()));
        assert_eq!(fs::read(store.staged_exe_path(&build)).unwrap(), b"binary");
    }
}
