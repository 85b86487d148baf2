use crate::services::update_job::{JobHandle, JobState};
use tracing::{debug, info, warn};

/// Consumer-side reactions to background work. Only ever called from
/// `Notifier::tick`, i.e. on the consumer's own thread.
pub trait NotifyHandler {
    fn on_data_refreshed(&mut self);
    fn on_update_failed(&mut self, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No context yet; nothing is acted on.
    Unarmed,
    /// Armed, but no job is being tracked.
    Idle,
    Running(Option<f64>),
    Refreshed,
    Failed(String),
}

enum Armed<H> {
    NotYet,
    Ready(H),
}

/// Polling bridge between background jobs and the consumer thread.
///
/// The host calls `tick` on a timer from a single thread. Background workers
/// never touch consumer state; every consumer-visible change happens inside a
/// tick. Ticks before `arm` are ignored, so the timer may start before the
/// data it reports on exists.
pub struct Notifier<H: NotifyHandler> {
    context: Armed<H>,
    job: Option<JobHandle>,
}

impl<H: NotifyHandler> Default for Notifier<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: NotifyHandler> Notifier<H> {
    pub fn new() -> Self {
        Self {
            context: Armed::NotYet,
            job: None,
        }
    }

    /// Hands over the context once all its dependencies exist.
    pub fn arm(&mut self, context: H) {
        info!("Notifier armed");
        self.context = Armed::Ready(context);
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.context, Armed::Ready(_))
    }

    pub fn track(&mut self, job: Option<JobHandle>) {
        if job.is_some() {
            debug!("Notifier tracking a new update job");
        }
        self.job = job;
    }

    pub fn is_tracking(&self) -> bool {
        self.job.is_some()
    }

    pub fn context(&self) -> Option<&H> {
        match &self.context {
            Armed::Ready(context) => Some(context),
            Armed::NotYet => None,
        }
    }

    pub fn context_mut(&mut self) -> Option<&mut H> {
        match &mut self.context {
            Armed::Ready(context) => Some(context),
            Armed::NotYet => None,
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        let Armed::Ready(context) = &mut self.context else {
            return TickOutcome::Unarmed;
        };
        let Some(job) = &self.job else {
            return TickOutcome::Idle;
        };

        let snapshot = job.snapshot();
        match snapshot.state {
            JobState::Running => TickOutcome::Running(snapshot.progress()),
            JobState::Success => {
                self.job = None;
                info!("Background update finished: {}", snapshot.message);
                context.on_data_refreshed();
                TickOutcome::Refreshed
            }
            JobState::Error => {
                self.job = None;
                warn!("Background update failed: {}", snapshot.message);
                context.on_update_failed(&snapshot.message);
                TickOutcome::Failed(snapshot.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::update_job::UpdateJob;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        refreshed: usize,
        failures: Vec<String>,
    }

    impl NotifyHandler for Recorder {
        fn on_data_refreshed(&mut self) {
            self.refreshed += 1;
        }

        fn on_update_failed(&mut self, message: &str) {
            self.failures.push(message.to_string());
        }
    }

    #[test]
    fn unarmed_ticks_are_ignored() {
        let mut notifier: Notifier<Recorder> = Notifier::new();
        assert_eq!(notifier.tick(), TickOutcome::Unarmed);

        let job = Arc::new(UpdateJob::new());
        job.succeed("done");
        notifier.track(Some(Arc::clone(&job)));
        assert_eq!(notifier.tick(), TickOutcome::Unarmed);
        assert!(notifier.is_tracking());

        // The transition is picked up as soon as the context arrives.
        notifier.arm(Recorder::default());
        assert_eq!(notifier.tick(), TickOutcome::Refreshed);
        assert_eq!(notifier.context().unwrap().refreshed, 1);
    }

    #[test]
    fn success_is_reported_exactly_once() {
        let mut notifier = Notifier::new();
        notifier.arm(Recorder::default());
        assert_eq!(notifier.tick(), TickOutcome::Idle);

        let job = Arc::new(UpdateJob::new());
        notifier.track(Some(Arc::clone(&job)));
        assert_eq!(notifier.tick(), TickOutcome::Running(None));
        job.set_progress(1, 2);
        assert_eq!(notifier.tick(), TickOutcome::Running(Some(0.5)));

        job.succeed("catalog updated");
        assert_eq!(notifier.tick(), TickOutcome::Refreshed);
        for _ in 0..5 {
            assert_eq!(notifier.tick(), TickOutcome::Idle);
        }

        let recorder = notifier.context().unwrap();
        assert_eq!(recorder.refreshed, 1);
        assert!(recorder.failures.is_empty());
    }

    #[test]
    fn failure_passes_the_job_message() {
        let mut notifier = Notifier::new();
        notifier.arm(Recorder::default());

        let job = Arc::new(UpdateJob::new());
        notifier.track(Some(Arc::clone(&job)));
        job.fail("connection refused");

        assert_eq!(
            notifier.tick(),
            TickOutcome::Failed("connection refused".to_string())
        );
        assert_eq!(notifier.tick(), TickOutcome::Idle);

        let recorder = notifier.context_mut().unwrap();
        assert_eq!(recorder.failures, vec!["connection refused"]);
        assert_eq!(recorder.refreshed, 0);
    }
}
