use crate::domain::storage::Storage;
use crate::domain::{Catalog, CatalogEntry, InstallStatus, ListView, ViewCache, NO_RATING};
use crate::error::Result;
use crate::infrastructure::KeyedConfigStore;
use crate::services::updater::Updater;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// In-memory catalog plus the updater that refreshes its on-disk cache.
pub struct GameData {
    store: Arc<dyn Storage>,
    catalog: Catalog,
    views: ViewCache,
    version: Option<String>,
    pub updater: Updater,
}

impl GameData {
    pub fn new(store: Arc<dyn Storage>, updater: Updater) -> Self {
        Self {
            store,
            catalog: Catalog::new(),
            views: ViewCache::new(),
            version: None,
            updater,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    /// Version of the catalog currently in memory.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Reads the cached catalog and merges it with the locally stored ratings
    /// and install statuses. On any error the in-memory catalog is untouched.
    pub fn load_data(
        &mut self,
        ratings: &KeyedConfigStore,
        installed: &KeyedConfigStore,
    ) -> Result<usize> {
        let file = self.store.load_catalog()?;
        let ratings = ratings.snapshot()?;
        let installed = installed.snapshot()?;

        let mut entries = file.entries;
        for entry in &mut entries {
            entry.rating = ratings
                .get(&entry.id)
                .and_then(|r| r.parse::<i32>().ok())
                .filter(|r| (0..=5).contains(r))
                .unwrap_or(NO_RATING);
            entry.status = match installed.get(&entry.id) {
                Some(raw) => raw.parse().unwrap_or_else(|e| {
                    warn!("Ignoring install status of {}: {}", entry.id, e);
                    InstallStatus::NotInstalled
                }),
                None => InstallStatus::NotInstalled,
            };
        }

        let count = entries.len();
        self.catalog.replace(entries);
        self.version = Some(file.version);
        info!("Loaded {} catalog entries", count);
        Ok(count)
    }

    /// Re-applies persisted install statuses, e.g. after a worker finished
    /// a download. Returns how many entries changed.
    pub fn sync_install_status(&mut self, installed: &KeyedConfigStore) -> Result<usize> {
        let installed = installed.snapshot()?;
        let ids: Vec<String> = self.catalog.entries().map(|e| e.id.clone()).collect();

        let mut changed = 0;
        for id in ids {
            let status = installed
                .get(&id)
                .and_then(|raw| raw.parse().ok())
                .unwrap_or_default();
            if self.catalog.set_status(&id, status) {
                changed += 1;
            }
        }
        debug!("Install status sync changed {} entries", changed);
        Ok(changed)
    }

    pub fn view(&mut self, view: &ListView, last_time: i64) -> Vec<&CatalogEntry> {
        let ids = self.views.get(&self.catalog, view, last_time);
        ids.iter().filter_map(|id| self.catalog.get(id)).collect()
    }
}
