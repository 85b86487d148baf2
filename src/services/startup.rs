use crate::error::{RepoError, Result};
use crate::infrastructure::LockOwner;
use crate::services::repository::Repository;
use crate::services::update_job::{JobHandle, UpdateJob};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    Discovering,
    Locking,
    Loading,
    ForegroundUpdating,
    Ready,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The user gave up choosing a repository directory.
    NoRepository,
    /// The user declined to override a held lock.
    LockRefused,
    /// Even a forced lock could not be taken.
    LockFailed,
    UpdateFailed(String),
    UpdateCancelled,
    LoadFailed(String),
}

#[derive(Debug)]
pub enum StartupOutcome {
    /// Data is loaded. `job` is the background update, if one was started.
    Ready { job: Option<JobHandle> },
    /// A newer build took over; the caller must exit without further action.
    Relaunched,
    Aborted(AbortReason),
}

/// Everything startup needs from the user.
pub trait StartupPrompt {
    /// Asks for a repository directory. `failed` is set when the previous
    /// answer was not usable. `None` means the user gave up.
    fn choose_directory(&mut self, suggested: Option<&Path>, failed: bool) -> Option<PathBuf>;

    /// Asks whether to override a lock that another instance, or a crashed
    /// one, left behind.
    fn confirm_lock_override(&mut self, repo_dir: &Path, owner: Option<&LockOwner>) -> bool;

    /// Shows progress of a foreground update until it ends. Returns `true`
    /// only if the job succeeded.
    fn run_foreground(&mut self, job: &UpdateJob, destination: &Path) -> bool;

    fn error(&mut self, message: &str);
}

pub const LOCK_WARNING: &str = "This usually means that a previous instance crashed. But it MIGHT \
also mean you are running two instances at once.\n\nAre you SURE you want to continue? If two \
programs access the repository at the same time, data loss may occur!";

/// Drives a repository from nothing to loaded data.
pub struct Startup {
    repo_override: Option<PathBuf>,
    force_lock: bool,
    history: Vec<StartupState>,
}

impl Startup {
    pub fn new(repo_override: Option<PathBuf>) -> Self {
        Self {
            repo_override,
            force_lock: false,
            history: Vec::new(),
        }
    }

    /// Skips the contention prompt and overrides any lock.
    pub fn with_force_lock(mut self, force: bool) -> Self {
        self.force_lock = force;
        self
    }

    pub fn history(&self) -> &[StartupState] {
        &self.history
    }

    pub fn state(&self) -> Option<StartupState> {
        self.history.last().copied()
    }

    fn enter(&mut self, state: StartupState) {
        info!("Startup: {:?}", state);
        self.history.push(state);
    }

    fn abort(&mut self, reason: AbortReason) -> Result<StartupOutcome> {
        warn!("Startup aborted: {:?}", reason);
        self.enter(StartupState::Aborted);
        Ok(StartupOutcome::Aborted(reason))
    }

    pub fn run(
        &mut self,
        repo: &mut Repository,
        prompt: &mut dyn StartupPrompt,
    ) -> Result<StartupOutcome> {
        self.enter(StartupState::Discovering);
        if !self.discover(repo, prompt)? {
            return self.abort(AbortReason::NoRepository);
        }

        if repo.launch_newer_build()? {
            return Ok(StartupOutcome::Relaunched);
        }

        self.enter(StartupState::Locking);
        if let Some(reason) = self.lock(repo, prompt)? {
            return self.abort(reason);
        }

        self.enter(StartupState::Loading);
        match repo.load_data() {
            Ok(count) => {
                info!("Loaded {} entries, starting background update", count);
                let job = repo.start_job()?;
                self.enter(StartupState::Ready);
                return Ok(StartupOutcome::Ready { job });
            }
            Err(e) => info!("Load failed ({}). Doing foreground update", e),
        }

        // No usable local data: either nothing was downloaded yet, or the
        // format changed and the application itself may need updating.
        self.enter(StartupState::ForegroundUpdating);
        if let Some(job) = repo.start_job()? {
            let destination = repo.get_path("")?;
            if !prompt.run_foreground(&job, &destination) {
                if job.is_error() {
                    let message = job.message();
                    prompt.error(&format!("Download failed: {}", message));
                    return self.abort(AbortReason::UpdateFailed(message));
                }
                return self.abort(AbortReason::UpdateCancelled);
            }
        }

        if repo.launch_if_new()? {
            return Ok(StartupOutcome::Relaunched);
        }

        self.enter(StartupState::Loading);
        match repo.load_data() {
            Ok(count) => {
                info!("Loaded {} entries after foreground update", count);
                self.enter(StartupState::Ready);
                Ok(StartupOutcome::Ready { job: None })
            }
            Err(e) => {
                let message = match e {
                    RepoError::Load(inner) => inner.to_string(),
                    other => other.to_string(),
                };
                error!("Failed to load data: {}", message);
                prompt.error(&format!("Failed to load data: {}", message));
                self.abort(AbortReason::LoadFailed(message))
            }
        }
    }

    fn discover(&mut self, repo: &mut Repository, prompt: &mut dyn StartupPrompt) -> Result<bool> {
        if let Some(dir) = &self.repo_override {
            return match repo.set_repo(dir) {
                Ok(_) => Ok(true),
                Err(e) => {
                    prompt.error(&e.to_string());
                    Ok(false)
                }
            };
        }

        match repo.find_repo(None) {
            Ok(_) => return Ok(true),
            Err(RepoError::Discovery(reason)) => info!("No repository found: {}", reason),
            Err(e) => return Err(e),
        }

        let mut suggested = repo.default_path();
        let mut failed = false;
        loop {
            let Some(dir) = prompt.choose_directory(suggested.as_deref(), failed) else {
                return Ok(false);
            };
            match repo.find_repo(Some(&dir)) {
                Ok(_) => return Ok(true),
                Err(RepoError::Discovery(reason)) => {
                    info!("Rejected {}: {}", dir.display(), reason);
                    suggested = Some(dir);
                    failed = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn lock(
        &mut self,
        repo: &mut Repository,
        prompt: &mut dyn StartupPrompt,
    ) -> Result<Option<AbortReason>> {
        match repo.init_repo(self.force_lock) {
            Ok(()) => return Ok(None),
            Err(RepoError::LockContention { .. }) => {}
            Err(RepoError::LockFailure { reason, .. }) => {
                error!("Forced lock failed: {}", reason);
                prompt.error("Still unable to lock repository. Aborting.");
                return Ok(Some(AbortReason::LockFailed));
            }
            Err(e) => return Err(e),
        }

        let dir = repo.get_path("")?;
        let owner = repo.lock_owner();
        if !prompt.confirm_lock_override(&dir, owner.as_ref()) {
            return Ok(Some(AbortReason::LockRefused));
        }

        match repo.init_repo(true) {
            Ok(()) => Ok(None),
            Err(e) => {
                error!("Forced lock failed: {}", e);
                prompt.error("Still unable to lock repository. Aborting.");
                Ok(Some(AbortReason::LockFailed))
            }
        }
    }
}
