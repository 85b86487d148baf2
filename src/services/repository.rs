use crate::config::{Locations, RemoteConfig};
use crate::domain::storage::{Storage, StorageKeys};
use crate::domain::{Catalog, CatalogEntry, Fetcher, InstallStatus, Launcher, ListView, NO_RATING};
use crate::error::{RepoError, Result};
use crate::infrastructure::{FileSystemStore, KeyedConfigStore, LockFile, LockOwner};
use crate::services::game_data::GameData;
use crate::services::update_job::JobHandle;
use crate::services::updater::{launch_staged_build, Updater};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

const KEY_LAST_TIME: &str = "last_time";
const KEY_MIGRATED: &str = "migrated_v2";

/// Paths derived from the repository directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoPaths {
    pub dir: PathBuf,
    pub internal_dir: PathBuf,
    pub list_file: PathBuf,
}

impl RepoPaths {
    fn new(dir: PathBuf) -> Self {
        let internal_dir = dir.join(StorageKeys::INTERNAL_DIR);
        let list_file = internal_dir.join(StorageKeys::CATALOG);
        Self {
            dir,
            internal_dir,
            list_file,
        }
    }

    fn lock_file(&self) -> PathBuf {
        self.internal_dir.join(StorageKeys::LOCK)
    }
}

/// Everything that only exists once the repository is locked.
struct Initialized {
    lock: LockFile,
    conf: Arc<KeyedConfigStore>,
    main: Arc<KeyedConfigStore>,
    news: Arc<KeyedConfigStore>,
    ratings: Arc<KeyedConfigStore>,
    data: GameData,
}

/// The locked local directory holding the cached catalog and local config.
pub struct Repository {
    locations: Locations,
    remote: RemoteConfig,
    offline: bool,
    fetcher: Arc<dyn Fetcher>,
    launcher: Arc<dyn Launcher>,
    app_version: String,
    relaunch_args: Vec<String>,
    paths: Option<RepoPaths>,
    state: Option<Initialized>,
    last_time: i64,
}

impl Repository {
    pub fn new(fetcher: Arc<dyn Fetcher>, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            locations: Locations::from_os(),
            remote: RemoteConfig::default(),
            offline: false,
            fetcher,
            launcher,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            relaunch_args: Vec::new(),
            paths: None,
            state: None,
            last_time: 0,
        }
    }

    pub fn with_locations(mut self, locations: Locations) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    pub fn with_relaunch_args(mut self, args: Vec<String>) -> Self {
        self.relaunch_args = args;
        self
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn is_locked(&self) -> bool {
        self.state.is_some()
    }

    /// The standard location suggested to the user when discovery fails.
    pub fn default_path(&self) -> Option<PathBuf> {
        self.locations.standard.clone()
    }

    /// Finds or establishes a repository. With `location` set only that
    /// directory is considered. Otherwise the standard location is probed,
    /// then locations used by older versions, and finally the standard
    /// location is created. Does not lock.
    pub fn find_repo(&mut self, location: Option<&Path>) -> Result<PathBuf> {
        let dir = match location {
            Some(dir) if !dir.as_os_str().is_empty() => {
                if !is_usable(dir) {
                    return Err(RepoError::Discovery(format!(
                        "{} is not a writable directory",
                        dir.display()
                    )));
                }
                dir.to_path_buf()
            }
            _ => self.probe_locations()?,
        };
        self.adopt(dir)
    }

    /// Uses `dir` as the repository without probing any other location.
    pub fn set_repo(&mut self, dir: impl Into<PathBuf>) -> Result<PathBuf> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        self.adopt(dir)
    }

    fn probe_locations(&self) -> Result<PathBuf> {
        let standard = self.locations.standard.as_ref();
        let candidates = standard.into_iter().chain(self.locations.legacy.iter());

        for candidate in candidates {
            if candidate.is_dir() {
                if is_usable(candidate) {
                    debug!("Found repository at {}", candidate.display());
                    return Ok(candidate.clone());
                }
                warn!("{} exists but is not writable", candidate.display());
            }
        }

        match standard {
            Some(dir) if !dir.exists() && is_usable(dir) => {
                info!("Creating repository at {}", dir.display());
                Ok(dir.clone())
            }
            Some(dir) => Err(RepoError::Discovery(format!(
                "{} is not usable and no older repository was found",
                dir.display()
            ))),
            None => Err(RepoError::Discovery(
                "could not determine a standard data directory".to_string(),
            )),
        }
    }

    fn adopt(&mut self, dir: PathBuf) -> Result<PathBuf> {
        let dir = dir.canonicalize().unwrap_or(dir);
        if let (Some(paths), true) = (&self.paths, self.state.is_some()) {
            if paths.dir != dir {
                return Err(RepoError::InvalidState(
                    "cannot move a repository that is already locked",
                ));
            }
        }
        info!("Using repository {}", dir.display());
        self.paths = Some(RepoPaths::new(dir.clone()));
        Ok(dir)
    }

    pub fn paths(&self) -> Result<&RepoPaths> {
        self.paths
            .as_ref()
            .ok_or(RepoError::InvalidState("no repository has been found yet"))
    }

    /// Path of a file or directory inside the repository.
    pub fn get_path(&self, name: impl AsRef<Path>) -> Result<PathBuf> {
        Ok(self.paths()?.dir.join(name))
    }

    pub fn get_inst_dir(&self, id: &str) -> Result<PathBuf> {
        if !is_valid_id(id) {
            return Err(RepoError::InvalidId(id.to_string()));
        }
        self.get_path(Path::new(StorageKeys::GAMES_DIR).join(id))
    }

    /// Owner recorded in the lock marker, for the override prompt.
    pub fn lock_owner(&self) -> Option<LockOwner> {
        let paths = self.paths.as_ref()?;
        LockFile::new(paths.lock_file()).owner()
    }

    /// Locks the repository, converts data left by older versions and opens
    /// the config stores. Fails with `LockContention` when another process
    /// holds the lock, unless `force_lock` is set.
    pub fn init_repo(&mut self, force_lock: bool) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let paths = self.paths()?.clone();

        fs::create_dir_all(&paths.internal_dir).map_err(|e| {
            if force_lock {
                RepoError::LockFailure {
                    path: paths.lock_file(),
                    reason: e.to_string(),
                }
            } else {
                RepoError::Io(e)
            }
        })?;

        let mut lock = LockFile::new(paths.lock_file());
        lock.acquire(force_lock)?;

        let open = |name: &str| Arc::new(KeyedConfigStore::new(paths.internal_dir.join(name)));
        let conf = open(StorageKeys::CONF);
        let main = open(StorageKeys::INSTALLED);
        let news = open(StorageKeys::NEWS);
        let ratings = open(StorageKeys::RATINGS);

        migrate_legacy(&paths, &conf, &main)?;
        self.last_time = conf.get_int(KEY_LAST_TIME)?.unwrap_or(0);

        let store: Arc<dyn Storage> = Arc::new(FileSystemStore::new(&paths.internal_dir));
        let updater = Updater::new(
            Arc::clone(&store),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.launcher),
            self.remote.clone(),
            self.offline,
        )
        .with_app_version(self.app_version.clone())
        .with_relaunch_args(self.relaunch_args.clone());

        self.state = Some(Initialized {
            lock,
            conf,
            main,
            news,
            ratings,
            data: GameData::new(store, updater),
        });
        info!("Repository {} initialized", paths.dir.display());
        Ok(())
    }

    fn initialized(&self) -> Result<&Initialized> {
        self.state
            .as_ref()
            .ok_or(RepoError::InvalidState("repository is not initialized"))
    }

    fn initialized_mut(&mut self) -> Result<&mut Initialized> {
        self.state
            .as_mut()
            .ok_or(RepoError::InvalidState("repository is not initialized"))
    }

    pub fn lock_path(&self) -> Result<&Path> {
        Ok(self.initialized()?.lock.path())
    }

    pub fn data(&self) -> Result<&GameData> {
        Ok(&self.initialized()?.data)
    }

    pub fn data_mut(&mut self) -> Result<&mut GameData> {
        Ok(&mut self.initialized_mut()?.data)
    }

    /// Main lookup of all known entries.
    pub fn list(&self) -> Result<&Catalog> {
        Ok(self.data()?.catalog())
    }

    pub fn view(&mut self, view: &ListView) -> Result<Vec<&CatalogEntry>> {
        let last_time = self.last_time;
        Ok(self.data_mut()?.view(view, last_time))
    }

    pub fn load_data(&mut self) -> Result<usize> {
        let state = self.initialized_mut()?;
        state.data.load_data(&state.ratings, &state.main)
    }

    pub fn start_job(&mut self) -> Result<Option<JobHandle>> {
        Ok(self.data_mut()?.updater.start_job())
    }

    pub fn launch_if_new(&self) -> Result<bool> {
        self.data()?.updater.launch_if_new()
    }

    /// Checks for a newer staged build before the repository is locked.
    pub fn launch_newer_build(&self) -> Result<bool> {
        let store = FileSystemStore::new(&self.paths()?.internal_dir);
        launch_staged_build(
            &store,
            self.launcher.as_ref(),
            &self.app_version,
            &self.relaunch_args,
        )
    }

    /// The last known `add_date` of the previous run.
    pub fn get_last_time(&self) -> i64 {
        self.last_time
    }

    /// Stores the value for the next run. The current run keeps using the
    /// value it started with.
    pub fn set_last_time(&self, value: i64) -> Result<()> {
        self.initialized()?.conf.set_int(KEY_LAST_TIME, value)
    }

    /// Rating 0-5, or -1 if none is set.
    pub fn get_rating(&self, id: &str) -> Result<i32> {
        let rating = self.initialized()?.ratings.get_int(id)?;
        Ok(rating
            .filter(|r| (0..=5).contains(r))
            .map(|r| r as i32)
            .unwrap_or(NO_RATING))
    }

    pub fn set_rating(&mut self, id: &str, urlname: &str, rating: i32) -> Result<()> {
        if !(0..=5).contains(&rating) {
            return Err(RepoError::InvalidRating(rating));
        }
        let state = self
            .state
            .as_mut()
            .ok_or(RepoError::InvalidState("repository is not initialized"))?;
        state.ratings.set_int(id, i64::from(rating))?;
        state.data.catalog_mut().set_rating(id, rating);

        if !self.offline {
            match self.remote.rating_url(urlname, rating) {
                Ok(url) => report(Arc::clone(&self.fetcher), url, "rating"),
                Err(e) => warn!("Not reporting rating: {}", e),
            }
        }
        Ok(())
    }

    /// A cloneable handle for worker threads that update install status.
    pub fn status_handle(&self) -> Result<StatusHandle> {
        Ok(StatusHandle {
            main: Arc::clone(&self.initialized()?.main),
            fetcher: Arc::clone(&self.fetcher),
            remote: self.remote.clone(),
            offline: self.offline,
        })
    }

    /// Safe to call from worker threads through `status_handle`.
    pub fn set_install_status(&self, id: &str, status: InstallStatus) -> Result<()> {
        self.status_handle()?.set_install_status(id, status)
    }

    pub fn download_finished(&self, id: &str, urlname: &str) -> Result<()> {
        self.status_handle()?.download_finished(id, urlname)
    }

    pub fn install_status(&self, id: &str) -> Result<InstallStatus> {
        Ok(self
            .initialized()?
            .main
            .get(id)?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default())
    }

    /// Copies persisted install statuses into the in-memory catalog. Runs on
    /// the consumer thread, typically from a notifier tick.
    pub fn sync_install_status(&mut self) -> Result<usize> {
        let state = self.initialized_mut()?;
        state.data.sync_install_status(&state.main)
    }

    pub fn is_news_read(&self, id: &str) -> Result<bool> {
        self.initialized()?.news.get_bool(id)
    }

    pub fn mark_news_read(&self, id: &str) -> Result<()> {
        self.initialized()?.news.set_bool(id, true)
    }
}

/// Write access to install status that can be moved to worker threads.
#[derive(Clone)]
pub struct StatusHandle {
    main: Arc<KeyedConfigStore>,
    fetcher: Arc<dyn Fetcher>,
    remote: RemoteConfig,
    offline: bool,
}

impl StatusHandle {
    pub fn set_install_status(&self, id: &str, status: InstallStatus) -> Result<()> {
        debug!("Install status of {} is now {}", id, status);
        self.main.set(id, status.as_str())
    }

    /// Marks the item installed and bumps the server-side download counter.
    /// The counter is best effort and never fails the call.
    pub fn download_finished(&self, id: &str, urlname: &str) -> Result<()> {
        self.set_install_status(id, InstallStatus::Installed)?;
        if !self.offline {
            match self.remote.counter_url(urlname) {
                Ok(url) => report(Arc::clone(&self.fetcher), url, "download counter"),
                Err(e) => warn!("Not reporting download: {}", e),
            }
        }
        Ok(())
    }
}

/// Fire-and-forget request on a short-lived thread.
fn report(fetcher: Arc<dyn Fetcher>, url: String, what: &'static str) {
    let spawned = thread::Builder::new()
        .name(format!("report-{}", what.replace(' ', "-")))
        .spawn(move || {
            if let Err(e) = fetcher.fetch(&url) {
                warn!("Failed to report {}: {}", what, e);
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn {} reporter: {}", what, e);
    }
}

fn is_valid_id(id: &str) -> bool {
    static ID_PATTERN: OnceCell<Regex> = OnceCell::new();
    let re = ID_PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());
    re.is_match(id) && !id.contains("..")
}

/// A directory is usable if it exists (or can be created) and we can write
/// into it.
fn is_usable(dir: &Path) -> bool {
    if fs::create_dir_all(dir).is_err() || !dir.is_dir() {
        return false;
    }
    let probe = dir.join(".write-test");
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(e) => {
            debug!("{} is not writable: {}", dir.display(), e);
            false
        }
    }
}

/// Older versions kept the config stores next to the games and the last-seen
/// time in a plain text file, with install status stored as integers.
fn migrate_legacy(
    paths: &RepoPaths,
    conf: &KeyedConfigStore,
    main: &KeyedConfigStore,
) -> Result<()> {
    if conf.get_bool(KEY_MIGRATED)? {
        return Ok(());
    }

    for name in [StorageKeys::INSTALLED, StorageKeys::NEWS, StorageKeys::RATINGS] {
        let legacy = paths.dir.join(name);
        if !legacy.is_file() {
            continue;
        }
        let current = paths.internal_dir.join(name);
        if current.exists() {
            // Both exist: keep current values, fill in what only the old file had.
            let old = KeyedConfigStore::new(&legacy).snapshot()?;
            let new = KeyedConfigStore::new(&current);
            let existing = new.snapshot()?;
            new.set_many(old.into_iter().filter(|(k, _)| !existing.contains_key(k)))?;
            fs::rename(&legacy, legacy.with_extension("json.migrated"))?;
        } else {
            fs::rename(&legacy, &current)?;
        }
        info!("Migrated {} from an older version", name);
    }

    let legacy_time = paths.dir.join(StorageKeys::LEGACY_LAST_TIME);
    if legacy_time.is_file() {
        match fs::read_to_string(&legacy_time)?.trim().parse::<i64>() {
            Ok(value) if conf.get_int(KEY_LAST_TIME)?.is_none() => {
                conf.set_int(KEY_LAST_TIME, value)?;
            }
            Ok(_) => {}
            Err(e) => warn!("Ignoring unreadable {}: {}", legacy_time.display(), e),
        }
        fs::remove_file(&legacy_time)?;
    }

    let converted: Vec<(String, String)> = main
        .snapshot()?
        .into_iter()
        .filter_map(|(id, raw)| {
            let code = raw.trim().parse::<i64>().ok()?;
            let status = InstallStatus::from_legacy(code)?;
            Some((id, status.as_str().to_string()))
        })
        .collect();
    if !converted.is_empty() {
        info!("Converted {} legacy install statuses", converted.len());
        main.set_many(converted)?;
    }

    conf.set_bool(KEY_MIGRATED, true)
}
