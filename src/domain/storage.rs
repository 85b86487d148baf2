use super::{CatalogFile, CatalogHeader, StagedBuild};
use crate::error::{LoadError, Result};
use std::path::PathBuf;

/// On-disk state that update jobs replace wholesale. Every `save_*` either
/// fully lands or leaves the previous content in place.
pub trait Storage: Send + Sync {
    fn load_catalog(&self) -> std::result::Result<CatalogFile, LoadError>;
    fn load_catalog_header(&self) -> Option<CatalogHeader>;
    fn save_catalog_bytes(&self, bytes: &[u8]) -> Result<()>;
    fn load_staged_build(&self) -> Result<Option<StagedBuild>>;
    fn save_staged_build(&self, build: &StagedBuild, exe_bytes: &[u8]) -> Result<()>;
    fn staged_exe_path(&self, build: &StagedBuild) -> PathBuf;
}

pub struct StorageKeys;

impl StorageKeys {
    pub const INTERNAL_DIR: &'static str = "data";
    pub const GAMES_DIR: &'static str = "games";
    pub const APP_DIR: &'static str = "app";

    pub const CATALOG: &'static str = "catalog.json";
    pub const LOCK: &'static str = "lock";
    pub const CONF: &'static str = "config.json";
    pub const INSTALLED: &'static str = "installed.json";
    pub const NEWS: &'static str = "news.json";
    pub const RATINGS: &'static str = "ratings.json";
    pub const STAGED_BUILD: &'static str = "staged.json";

    // Files older versions kept in the repository root
    pub const LEGACY_LAST_TIME: &'static str = "last_time";
}
