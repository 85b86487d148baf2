use super::entry::CatalogEntry;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Bump when the cache layout changes. Caches written with another schema
/// are refused by `load_data` and replaced by the next update.
pub const CATALOG_SCHEMA: u32 = 2;

/// The catalog cache file, also the format served by the remote catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub schema: u32,
    pub version: String,
    #[serde(default)]
    pub generated: Option<String>,
    pub entries: Vec<CatalogEntry>,
}

impl CatalogFile {
    pub fn new(version: impl Into<String>, entries: Vec<CatalogEntry>) -> Self {
        Self {
            schema: CATALOG_SCHEMA,
            version: version.into(),
            generated: Some(Utc::now().to_rfc3339()),
            entries,
        }
    }
}

/// Only the header of a cache file, used to compare versions without
/// deserializing every entry.
#[derive(Debug, Deserialize)]
pub struct CatalogHeader {
    pub schema: u32,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteManifest {
    pub catalog: RemoteFile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppRelease>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFile {
    pub url: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRelease {
    pub version: String,
    pub url: String,
    pub exe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Pointer to an application build downloaded into the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedBuild {
    pub version: String,
    pub exe: String,
}

/// Compares dotted numeric versions ("1.10.2" > "1.9"). Non-numeric parts
/// compare as zero.
pub fn is_newer_version(candidate: &str, current: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.trim_start_matches('v')
            .split('.')
            .map(|part| part.trim().parse().unwrap_or(0))
            .collect()
    };
    let (mut a, mut b) = (parse(candidate), parse(current));
    let len = a.len().max(b.len());
    a.resize(len, 0);
    b.resize(len, 0);
    a > b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_comparison() {
        assert!(is_newer_version("1.10.0", "1.9.3"));
        assert!(is_newer_version("v2", "1.99"));
        assert!(!is_newer_version("1.0", "1.0.0"));
        assert!(!is_newer_version("0.9", "1.0"));
    }

    #[test]
    fn header_reads_without_entries() {
        let json = r#"{"schema":2,"version":"7","entries":[{"id":"x","title":"X","urlname":"x","add_date":1}]}"#;
        let header: CatalogHeader = serde_json::from_str(json).unwrap();
        assert_eq!(header.schema, 2);
        assert_eq!(header.version, "7");
    }
}
