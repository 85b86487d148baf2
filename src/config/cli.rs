use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Use this repository directory. Will not use or set the default location.
    #[arg(short, long)]
    pub repo: Option<PathBuf>,

    /// Offline mode: never contact the server
    #[arg(short, long)]
    pub offline: bool,

    /// Optional JSON file overriding the remote endpoints
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Base URL of the catalog server
    #[arg(long, env = "GAMEREPO_BASE_URL")]
    pub base_url: Option<String>,

    /// How often the notifier polls background jobs
    #[arg(long, default_value_t = 250)]
    pub poll_interval_ms: u64,

    /// Override a repository lock left behind by another process
    #[arg(long)]
    pub force_lock: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Wait for the background update, then print a summary (default)
    Status,
    /// List catalog entries
    List {
        #[arg(value_enum, default_value_t = ViewArg::All)]
        view: ViewArg,
    },
    /// Search titles and tags
    Search { query: String },
    /// Rate an entry from 0 to 5
    Rate { id: String, rating: i32 },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewArg {
    All,
    New,
    Installed,
    Rated,
}
