use crate::config::RemoteConfig;
use crate::domain::storage::Storage;
use crate::domain::{is_newer_version, Fetcher, Launcher, RemoteManifest, StagedBuild, CATALOG_SCHEMA};
use crate::error::{RepoError, Result};
use crate::infrastructure::parse_catalog;
use crate::services::update_job::{JobHandle, UpdateJob};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// Creates and tracks update jobs for one repository.
pub struct Updater {
    store: Arc<dyn Storage>,
    fetcher: Arc<dyn Fetcher>,
    launcher: Arc<dyn Launcher>,
    remote: RemoteConfig,
    offline: bool,
    app_version: String,
    relaunch_args: Vec<String>,
    current: Option<JobHandle>,
}

impl Updater {
    pub fn new(
        store: Arc<dyn Storage>,
        fetcher: Arc<dyn Fetcher>,
        launcher: Arc<dyn Launcher>,
        remote: RemoteConfig,
        offline: bool,
    ) -> Self {
        Self {
            store,
            fetcher,
            launcher,
            remote,
            offline,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            relaunch_args: Vec::new(),
            current: None,
        }
    }

    /// Version the running binary is compared against when looking for a
    /// staged build.
    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    pub fn with_relaunch_args(mut self, args: Vec<String>) -> Self {
        self.relaunch_args = args;
        self
    }

    pub fn current_job(&self) -> Option<JobHandle> {
        self.current.clone()
    }

    /// Starts a background update and returns its handle, or `None` when no
    /// update is possible (offline). While a job is still running its handle
    /// is returned again instead of starting a second one.
    pub fn start_job(&mut self) -> Option<JobHandle> {
        if self.offline {
            info!("Offline mode, not starting an update job");
            return None;
        }

        if let Some(job) = &self.current {
            if job.is_running() {
                debug!("Update job already running");
                return Some(Arc::clone(job));
            }
        }

        let job: JobHandle = Arc::new(UpdateJob::new());
        let worker = UpdateWorker {
            store: Arc::clone(&self.store),
            fetcher: Arc::clone(&self.fetcher),
            remote: self.remote.clone(),
            app_version: self.app_version.clone(),
            job: Arc::clone(&job),
        };

        let spawned = thread::Builder::new()
            .name("update-job".to_string())
            .spawn(move || worker.run());
        if let Err(e) = spawned {
            error!("Failed to spawn update job: {}", e);
            job.fail(format!("Could not start update: {}", e));
        }

        self.current = Some(Arc::clone(&job));
        Some(job)
    }

    /// Launches a staged application build newer than the running one.
    /// Returns `true` when control was handed off; the caller must stop.
    pub fn launch_if_new(&self) -> Result<bool> {
        launch_staged_build(
            self.store.as_ref(),
            self.launcher.as_ref(),
            &self.app_version,
            &self.relaunch_args,
        )
    }
}

pub fn launch_staged_build(
    store: &dyn Storage,
    launcher: &dyn Launcher,
    current_version: &str,
    args: &[String],
) -> Result<bool> {
    let Some(build) = store.load_staged_build()? else {
        return Ok(false);
    };
    if !is_newer_version(&build.version, current_version) {
        debug!(
            "Staged build {} is not newer than {}",
            build.version, current_version
        );
        return Ok(false);
    }

    let exe = store.staged_exe_path(&build);
    if !exe.is_file() {
        warn!("Staged build {} is missing {}", build.version, exe.display());
        return Ok(false);
    }

    info!("Handing off to build {} at {}", build.version, exe.display());
    launcher.launch(&exe, args)?;
    Ok(true)
}

struct UpdateWorker {
    store: Arc<dyn Storage>,
    fetcher: Arc<dyn Fetcher>,
    remote: RemoteConfig,
    app_version: String,
    job: JobHandle,
}

impl UpdateWorker {
    fn run(self) {
        match self.execute() {
            Ok(message) => {
                info!("Update finished: {}", message);
                self.job.succeed(message);
            }
            Err(e) => {
                error!("Update failed: {}", e);
                self.job.fail(e.to_string());
            }
        }
    }

    fn execute(&self) -> Result<String> {
        self.job.set_status("Fetching manifest");
        let bytes = self.fetcher.fetch(&self.remote.manifest_url())?;
        let manifest: RemoteManifest = serde_json::from_slice(&bytes)
            .map_err(|e| RepoError::UpdateJob(format!("invalid manifest: {}", e)))?;

        let catalog_changed = match self.store.load_catalog_header() {
            Some(local) => {
                local.schema != CATALOG_SCHEMA || local.version != manifest.catalog.version
            }
            None => true,
        };
        let app_update = manifest
            .app
            .as_ref()
            .filter(|app| is_newer_version(&app.version, &self.app_version))
            .filter(|app| !self.already_staged(&app.version));

        let downloads = u64::from(catalog_changed) + u64::from(app_update.is_some());
        self.job.set_progress(0, downloads);

        // Everything is downloaded and validated before anything is written,
        // so a failure part way leaves the repository as it was.
        let mut new_catalog = None;
        if catalog_changed {
            self.job.set_status("Downloading catalog");
            let url = self.remote.resolve(&manifest.catalog.url);
            let bytes = self.fetcher.fetch(&url)?;
            if let Some(size) = manifest.catalog.size {
                if size != bytes.len() as u64 {
                    return Err(RepoError::UpdateJob(format!(
                        "catalog size mismatch: expected {} bytes, got {}",
                        size,
                        bytes.len()
                    )));
                }
            }
            let catalog = parse_catalog(&bytes).map_err(|e| {
                RepoError::UpdateJob(format!("downloaded catalog is unusable: {}", e))
            })?;
            self.job.add_progress(1);
            new_catalog = Some((catalog, bytes));
        }

        let mut new_build = None;
        if let Some(app) = app_update {
            if !is_plain_file_name(&app.exe) || !is_plain_file_name(&app.version) {
                return Err(RepoError::UpdateJob(format!(
                    "refusing application build {:?} / {:?}",
                    app.version, app.exe
                )));
            }
            self.job.set_status(format!("Downloading version {}", app.version));
            let bytes = self.fetcher.fetch(&self.remote.resolve(&app.url))?;
            let build = StagedBuild {
                version: app.version.clone(),
                exe: app.exe.clone(),
            };
            self.job.add_progress(1);
            new_build = Some((build, bytes));
        }

        // The catalog replace must be the last fallible step.
        let mut summary = Vec::new();
        let staged = match new_build {
            Some((build, bytes)) => {
                self.store.save_staged_build(&build, &bytes)?;
                Some(build.version)
            }
            None => None,
        };
        if let Some((catalog, bytes)) = new_catalog {
            self.store.save_catalog_bytes(&bytes)?;
            summary.push(format!(
                "catalog updated to version {} ({} entries)",
                catalog.version,
                catalog.entries.len()
            ));
        }
        if let Some(version) = staged {
            summary.push(format!("version {} staged", version));
        }

        if summary.is_empty() {
            Ok("catalog is up to date".to_string())
        } else {
            Ok(summary.join(", "))
        }
    }

    fn already_staged(&self, version: &str) -> bool {
        match self.store.load_staged_build() {
            Ok(Some(build)) => build.version == version && self.store.staged_exe_path(&build).is_file(),
            _ => false,
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
