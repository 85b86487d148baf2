use crate::config::cli::Args;
use crate::error::{RepoError, Result};
use clap::Parser;
use reqwest::Url;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod cli;

pub const APP_NAME: &str = "gamerepo";

/// Endpoints of the catalog server. Everything is relative to `base_url`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub manifest: String,
    pub counter_path: String,
    pub rating_path: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://catalog.gamerepo.dev/v2".to_string(),
            manifest: "manifest.json".to_string(),
            counter_path: "count".to_string(),
            rating_path: "rate".to_string(),
            timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    fn join(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn manifest_url(&self) -> String {
        self.join(&self.manifest)
    }

    /// Resolves a URL given in the manifest, which may be relative.
    pub fn resolve(&self, url: &str) -> String {
        self.join(url)
    }

    fn with_query(&self, path: &str, params: &[(&str, String)]) -> Result<String> {
        let base = self.join(path);
        Url::parse_with_params(&base, params)
            .map(String::from)
            .map_err(|e| RepoError::Other(format!("invalid URL {}: {}", base, e)))
    }

    pub fn counter_url(&self, urlname: &str) -> Result<String> {
        self.with_query(&self.counter_path, &[("game", urlname.to_string())])
    }

    pub fn rating_url(&self, urlname: &str, rating: i32) -> Result<String> {
        self.with_query(
            &self.rating_path,
            &[("game", urlname.to_string()), ("rate", rating.to_string())],
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where repositories are looked for when no directory is given.
#[derive(Debug, Clone)]
pub struct Locations {
    pub standard: Option<PathBuf>,
    pub legacy: Vec<PathBuf>,
}

impl Locations {
    pub fn from_os() -> Self {
        let standard = dirs::data_dir().map(|d| d.join(APP_NAME));
        let mut legacy = Vec::new();
        if let Some(home) = dirs::home_dir() {
            legacy.push(home.join(format!(".{}", APP_NAME)));
        }
        if let Some(docs) = dirs::document_dir() {
            legacy.push(docs.join(APP_NAME));
        }
        Self { standard, legacy }
    }

    /// Only the given directory, no legacy probing. Used by tests and `--repo`.
    pub fn fixed(dir: impl Into<PathBuf>) -> Self {
        Self {
            standard: Some(dir.into()),
            legacy: Vec::new(),
        }
    }
}

pub struct Config {
    pub args: Args,
    pub remote: RemoteConfig,
}

impl Config {
    pub fn new() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let mut remote = match &args.config_file {
            Some(path) => {
                info!("Loading remote config from {}", path.display());
                serde_json::from_str(&std::fs::read_to_string(path)?)?
            }
            None => RemoteConfig::default(),
        };
        if let Some(base_url) = &args.base_url {
            remote.base_url = base_url.clone();
        }

        Ok(Self { args, remote })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.args.poll_interval_ms.max(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_cleanly() {
        let remote = RemoteConfig {
            base_url: "https://example.org/api/".to_string(),
            ..RemoteConfig::default()
        };
        assert_eq!(remote.manifest_url(), "https://example.org/api/manifest.json");
        assert_eq!(remote.resolve("/files/catalog.json"), "https://example.org/api/files/catalog.json");
        assert_eq!(remote.resolve("http://cdn.example.org/c.json"), "http://cdn.example.org/c.json");
        assert_eq!(remote.counter_url("alpha").unwrap(), "https://example.org/api/count?game=alpha");
        assert_eq!(remote.rating_url("alpha", 4).unwrap(), "https://example.org/api/rate?game=alpha&rate=4");
    }

    #[test]
    fn urlnames_are_escaped_in_queries() {
        let remote = RemoteConfig {
            base_url: "https://example.org/api".to_string(),
            ..RemoteConfig::default()
        };
        assert_eq!(
            remote.rating_url("a&rate=5", 1).unwrap(),
            "https://example.org/api/rate?game=a%26rate%3D5&rate=1"
        );
        assert_eq!(
            remote.counter_url("x y").unwrap(),
            "https://example.org/api/count?game=x+y"
        );

        let broken = RemoteConfig {
            base_url: "not a url".to_string(),
            ..RemoteConfig::default()
        };
        assert!(broken.counter_url("alpha").is_err());
    }

    #[test]
    fn args_override_base_url() {
        let args = Args::parse_from(["gamerepo", "--offline", "--base-url", "http://localhost:9000"]);
        let config = Config::from_args(args).unwrap();
        assert!(config.args.offline);
        assert_eq!(config.remote.base_url, "http://localhost:9000");
        assert_eq!(config.remote.manifest, "manifest.json");
    }
}
