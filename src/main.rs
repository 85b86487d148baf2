use gamerepo::config::cli::{Command, ViewArg};
use gamerepo::config::Config;
use gamerepo::domain::{CatalogEntry, ListView};
use gamerepo::error::{RepoError, Result};
use gamerepo::infrastructure::{HttpFetcher, LockOwner, ProcessLauncher};
use gamerepo::services::notifier::{NotifyHandler, Notifier, TickOutcome};
use gamerepo::services::repository::Repository;
use gamerepo::services::startup::{Startup, StartupOutcome, StartupPrompt, LOCK_WARNING};
use gamerepo::services::update_job::{JobState, UpdateJob};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn, Level};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("An error occurred: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let config = Config::new()?;
    let level = config.args.log_level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let fetcher = Arc::new(HttpFetcher::with_timeout(config.remote.timeout())?);
    let mut repo = Repository::new(fetcher, Arc::new(ProcessLauncher))
        .with_remote(config.remote.clone())
        .with_offline(config.args.offline)
        .with_relaunch_args(std::env::args().skip(1).collect());

    let mut prompt = TerminalPrompt::new(config.poll_interval());
    let mut startup =
        Startup::new(config.args.repo.clone()).with_force_lock(config.args.force_lock);

    let job = match startup.run(&mut repo, &mut prompt)? {
        StartupOutcome::Ready { job } => job,
        StartupOutcome::Relaunched => {
            info!("A newer version took over");
            return Ok(ExitCode::SUCCESS);
        }
        StartupOutcome::Aborted(reason) => {
            info!("Exiting: {:?}", reason);
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut notifier = Notifier::new();
    notifier.track(job);
    notifier.arm(App { repo });

    // The catalog may change under us until the background job is done.
    loop {
        match notifier.tick() {
            TickOutcome::Running(_) => thread::sleep(config.poll_interval()),
            TickOutcome::Failed(message) => {
                eprintln!("Background update failed: {}", message);
                break;
            }
            _ => break,
        }
    }

    let app = notifier
        .context_mut()
        .ok_or(RepoError::InvalidState("notifier was never armed"))?;
    let command = config.args.command.clone().unwrap_or(Command::Status);
    app.execute(command)?;
    Ok(ExitCode::SUCCESS)
}

struct App {
    repo: Repository,
}

impl NotifyHandler for App {
    fn on_data_refreshed(&mut self) {
        match self.repo.load_data() {
            Ok(count) => info!("Reloaded {} entries", count),
            Err(e) => warn!("Keeping previous data, reload failed: {}", e),
        }
        if let Err(e) = self.repo.sync_install_status() {
            warn!("Failed to sync install status: {}", e);
        }
    }

    fn on_update_failed(&mut self, message: &str) {
        warn!("Update failed, continuing with cached data: {}", message);
    }
}

impl App {
    fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Status => self.status(),
            Command::List { view } => {
                let view = match view {
                    ViewArg::All => ListView::All,
                    ViewArg::New => ListView::New,
                    ViewArg::Installed => ListView::Installed,
                    ViewArg::Rated => ListView::Rated,
                };
                print_entries(&self.repo.view(&view)?);
                Ok(())
            }
            Command::Search { query } => {
                print_entries(&self.repo.view(&ListView::Search(query))?);
                Ok(())
            }
            Command::Rate { id, rating } => {
                let urlname = self
                    .repo
                    .list()?
                    .get(&id)
                    .map(|entry| entry.urlname.clone())
                    .ok_or_else(|| RepoError::InvalidId(id.clone()))?;
                self.repo.set_rating(&id, &urlname, rating)?;
                println!("Rated {} with {}", id, rating);
                Ok(())
            }
        }
    }

    fn status(&mut self) -> Result<()> {
        let path = self.repo.get_path("")?;
        let catalog = self.repo.list()?;
        let version = self.repo.data()?.version().unwrap_or("unknown").to_string();
        let total = catalog.len();
        let newest = catalog.newest_add_date();
        let new_count = self.repo.view(&ListView::New)?.len();

        println!("Repository: {}", path.display());
        println!("Catalog version: {}", version);
        println!("Entries: {} ({} new since last run)", total, new_count);
        if self.repo.is_offline() {
            println!("Offline mode");
        }

        if let Some(newest) = newest {
            if newest > self.repo.get_last_time() {
                self.repo.set_last_time(newest)?;
            }
        }
        Ok(())
    }
}

fn print_entries(entries: &[&CatalogEntry]) {
    if entries.is_empty() {
        println!("No entries");
        return;
    }
    for entry in entries {
        let rating = if entry.is_rated() {
            format!("{}/5", entry.rating)
        } else {
            "-".to_string()
        };
        println!(
            "{:<24} {:<40} {:<16} {}",
            entry.id, entry.title, entry.status, rating
        );
    }
}

struct TerminalPrompt {
    poll: Duration,
}

impl TerminalPrompt {
    fn new(poll: Duration) -> Self {
        Self { poll }
    }

    fn read_line(&self, question: &str) -> Option<String> {
        print!("{} ", question);
        io::stdout().flush().ok()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl StartupPrompt for TerminalPrompt {
    fn choose_directory(&mut self, suggested: Option<&Path>, failed: bool) -> Option<PathBuf> {
        if failed {
            println!("Cannot use that directory. Please select another one.");
        } else {
            println!("Please select a directory to store your games and data.");
        }
        let hint = suggested
            .map(|dir| format!(" [{}]", dir.display()))
            .unwrap_or_default();
        let answer = self.read_line(&format!("Directory{} (empty line to accept, q to quit):", hint))?;
        match answer.as_str() {
            "q" => None,
            "" => suggested.map(Path::to_path_buf),
            dir => Some(PathBuf::from(dir)),
        }
    }

    fn confirm_lock_override(&mut self, repo_dir: &Path, owner: Option<&LockOwner>) -> bool {
        println!(
            "Failed to lock the repository in {}",
            repo_dir.display()
        );
        if let Some(owner) = owner {
            println!("The lock is held by {}.", owner.describe());
        }
        println!("{}", LOCK_WARNING);
        matches!(
            self.read_line("Override the lock? [y/N]:").as_deref(),
            Some("y") | Some("Y") | Some("yes")
        )
    }

    fn run_foreground(&mut self, job: &UpdateJob, destination: &Path) -> bool {
        println!("Downloading data into {}", destination.display());
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);

        let result = job.wait(self.poll, |snapshot| {
            bar.set_length(snapshot.total);
            bar.set_position(snapshot.current);
            bar.set_message(snapshot.message.clone());
        });
        bar.finish_with_message(result.message.clone());
        result.state == JobState::Success
    }

    fn error(&mut self, message: &str) {
        eprintln!("{}", message);
    }
}
