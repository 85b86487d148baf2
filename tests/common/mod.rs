#![allow(dead_code)]

use gamerepo::config::{Locations, RemoteConfig};
use gamerepo::domain::{CatalogEntry, CatalogFile, Fetcher, Launcher};
use gamerepo::error::{RepoError, Result};
use gamerepo::services::repository::Repository;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const BASE_URL: &str = "http://catalog.test";
pub const APP_VERSION: &str = "1.0.0";

/// Serves canned responses and records every requested URL.
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .unwrap()
            .insert(format!("{}/{}", BASE_URL, path), body.into());
    }

    pub fn serve_catalog(&self, version: &str, entries: Vec<CatalogEntry>) {
        self.serve(
            "manifest.json",
            format!(
                r#"{{"catalog": {{"url": "catalog.json", "version": "{}"}}}}"#,
                version
            ),
        );
        self.serve("catalog.json", catalog_bytes(version, entries));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Reports go out on their own threads, so wait a little for them.
    pub fn wait_for_call(&self, url: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if self.calls().iter().any(|c| c == url) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| RepoError::Other(format!("GET {} returned 404 Not Found", url)))
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl RecordingLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launched(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.launched.lock().unwrap().clone()
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, exe: &Path, args: &[String]) -> Result<()> {
        self.launched
            .lock()
            .unwrap()
            .push((exe.to_path_buf(), args.to_vec()));
        Ok(())
    }
}

pub fn remote() -> RemoteConfig {
    RemoteConfig {
        base_url: BASE_URL.to_string(),
        ..RemoteConfig::default()
    }
}

pub fn entry(id: &str, title: &str, add_date: i64) -> CatalogEntry {
    CatalogEntry::new(id, title, format!("{}-url", id), add_date)
}

pub fn sample_entries() -> Vec<CatalogEntry> {
    vec![
        entry("alpha", "Alpha Quest", 100),
        entry("beta", "Beta Racer", 200),
        entry("gamma", "Gamma Tactics", 300),
    ]
}

pub fn catalog_bytes(version: &str, entries: Vec<CatalogEntry>) -> Vec<u8> {
    serde_json::to_vec_pretty(&CatalogFile::new(version, entries)).unwrap()
}

pub fn repository(
    dir: &Path,
    fetcher: &Arc<MockFetcher>,
    launcher: &Arc<RecordingLauncher>,
) -> Repository {
    let fetcher: Arc<dyn Fetcher> = fetcher.clone();
    let launcher: Arc<dyn Launcher> = launcher.clone();
    Repository::new(fetcher, launcher)
        .with_locations(Locations::fixed(dir))
        .with_remote(remote())
        .with_app_version(APP_VERSION)
}

/// Found and locked, but no data loaded.
pub fn initialized(dir: &Path, fetcher: &Arc<MockFetcher>) -> Repository {
    let mut repo = repository(dir, fetcher, &RecordingLauncher::new());
    repo.find_repo(None).unwrap();
    repo.init_repo(false).unwrap();
    repo
}
