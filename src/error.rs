use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No usable repository: {0}")]
    Discovery(String),
    #[error("Repository {} is locked by another process{}", .path.display(), owner_suffix(.owner))]
    LockContention {
        path: PathBuf,
        owner: Option<String>,
    },
    #[error("Unable to lock repository {}: {}", .path.display(), .reason)]
    LockFailure { path: PathBuf, reason: String },
    #[error("Failed to load data: {0}")]
    Load(#[from] LoadError),
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    #[error("Rating must be between 0 and 5, got {0}")]
    InvalidRating(i32),
    #[error("Invalid item id: {0:?}")]
    InvalidId(String),
    #[error("Update failed: {0}")]
    UpdateJob(String),
    #[error("{0}")]
    Other(String),
}

/// Reasons the on-disk catalog cannot be used. Any of these means "no usable
/// local data" and sends startup down the foreground update path.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("catalog cache {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("catalog cache is corrupt: {0}")]
    Corrupt(String),
    #[error("catalog schema {found} is not supported (expected {expected})")]
    SchemaIncompatible { found: u32, expected: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn owner_suffix(owner: &Option<String>) -> String {
    match owner {
        Some(owner) => format!(" ({})", owner),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, RepoError>;
