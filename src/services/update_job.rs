use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Success,
    Error,
}

impl JobState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            STATE_SUCCESS => JobState::Success,
            STATE_ERROR => JobState::Error,
            _ => JobState::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

const STATE_RUNNING: u8 = 0;
const STATE_SUCCESS: u8 = 1;
const STATE_ERROR: u8 = 2;

/// Point-in-time view of a job. Progress fields may be slightly behind each
/// other; `state` and `message` are consistent once terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub message: String,
    pub current: u64,
    pub total: u64,
}

impl JobSnapshot {
    /// `None` while the total is unknown.
    pub fn progress(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some((self.current as f64 / self.total as f64).min(1.0))
        }
    }
}

/// One fetch-and-merge attempt. Written only by its worker, read from anywhere.
///
/// The terminal state is published once: the message is stored first, then
/// the state flag with release ordering. A reader that observes a terminal
/// state (acquire) therefore also sees the final message.
#[derive(Debug)]
pub struct UpdateJob {
    state: AtomicU8,
    current: AtomicU64,
    total: AtomicU64,
    message: Mutex<String>,
}

pub type JobHandle = Arc<UpdateJob>;

impl Default for UpdateJob {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateJob {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_RUNNING),
            current: AtomicU64::new(0),
            total: AtomicU64::new(0),
            message: Mutex::new(String::new()),
        }
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == JobState::Running
    }

    pub fn is_success(&self) -> bool {
        self.state() == JobState::Success
    }

    pub fn is_error(&self) -> bool {
        self.state() == JobState::Error
    }

    pub fn message(&self) -> String {
        self.message
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state();
        JobSnapshot {
            state,
            message: self.message(),
            current: self.current.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }

    pub fn set_status(&self, message: impl Into<String>) {
        if self.is_running() {
            self.write_message(message.into());
        }
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn add_progress(&self, amount: u64) {
        self.current.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn set_progress(&self, current: u64, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.current.store(current, Ordering::Relaxed);
    }

    pub fn succeed(&self, message: impl Into<String>) -> bool {
        self.finish(STATE_SUCCESS, message.into())
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.finish(STATE_ERROR, message.into())
    }

    fn finish(&self, state: u8, message: String) -> bool {
        if !self.is_running() {
            return false;
        }
        self.write_message(message);
        self.state
            .compare_exchange(STATE_RUNNING, state, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    fn write_message(&self, message: String) {
        if let Ok(mut guard) = self.message.lock() {
            *guard = message;
        }
    }

    /// Blocks until the job is terminal, reporting each snapshot. Only the
    /// foreground update path uses this; the notifier polls instead.
    pub fn wait(&self, poll: Duration, mut on_progress: impl FnMut(&JobSnapshot)) -> JobSnapshot {
        loop {
            let snapshot = self.snapshot();
            on_progress(&snapshot);
            if snapshot.state.is_terminal() {
                return snapshot;
            }
            thread::sleep(poll);
        }
    }
}
