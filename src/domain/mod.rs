mod catalog;
mod entry;
pub(crate) mod fetch;
pub(crate) mod launch;
mod manifest;
pub mod storage;

pub use catalog::{derive_view, normalize_for_search, Catalog, ListView, ViewCache};
pub use entry::{CatalogEntry, InstallStatus, NO_RATING};
pub use fetch::Fetcher;
pub use launch::Launcher;
pub use manifest::{
    is_newer_version, AppRelease, CatalogFile, CatalogHeader, RemoteFile, RemoteManifest,
    StagedBuild, CATALOG_SCHEMA,
};
