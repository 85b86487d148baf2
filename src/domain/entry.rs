use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NO_RATING: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    #[default]
    NotInstalled,
    Installed,
    Installing,
    Failed,
    UpdateAvailable,
}

impl InstallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallStatus::NotInstalled => "not_installed",
            InstallStatus::Installed => "installed",
            InstallStatus::Installing => "installing",
            InstallStatus::Failed => "failed",
            InstallStatus::UpdateAvailable => "update_available",
        }
    }

    /// Older repositories stored the status as a bare integer.
    pub fn from_legacy(code: i64) -> Option<Self> {
        match code {
            0 => Some(InstallStatus::NotInstalled),
            1 => Some(InstallStatus::Installed),
            2 => Some(InstallStatus::Installing),
            3 => Some(InstallStatus::Failed),
            4 => Some(InstallStatus::UpdateAvailable),
            _ => None,
        }
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for InstallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "not_installed" => Ok(InstallStatus::NotInstalled),
            "installed" => Ok(InstallStatus::Installed),
            "installing" => Ok(InstallStatus::Installing),
            "failed" => Ok(InstallStatus::Failed),
            "update_available" => Ok(InstallStatus::UpdateAvailable),
            other => other
                .parse::<i64>()
                .ok()
                .and_then(InstallStatus::from_legacy)
                .ok_or_else(|| format!("unknown install status {:?}", other)),
        }
    }
}

/// One item of the remote catalog, as stored in the cache file. `rating` and
/// `status` are local state and are filled in from the config stores on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub urlname: String,
    pub add_date: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip, default = "no_rating")]
    pub rating: i32,
    #[serde(skip)]
    pub status: InstallStatus,
}

fn no_rating() -> i32 {
    NO_RATING
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>, urlname: impl Into<String>, add_date: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            urlname: urlname.into(),
            add_date,
            description: None,
            tags: Vec::new(),
            version: None,
            download_url: None,
            rating: NO_RATING,
            status: InstallStatus::NotInstalled,
        }
    }

    pub fn is_rated(&self) -> bool {
        self.rating != NO_RATING
    }

    pub fn is_installed(&self) -> bool {
        matches!(
            self.status,
            InstallStatus::Installed | InstallStatus::UpdateAvailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_names_and_legacy_codes() {
        assert_eq!("installed".parse(), Ok(InstallStatus::Installed));
        assert_eq!("4".parse(), Ok(InstallStatus::UpdateAvailable));
        assert_eq!(" 0 ".parse(), Ok(InstallStatus::NotInstalled));
        assert!("9".parse::<InstallStatus>().is_err());
        assert!("bogus".parse::<InstallStatus>().is_err());
    }

    #[test]
    fn local_state_is_not_serialized() {
        let mut entry = CatalogEntry::new("game1", "Game One", "game-one", 100);
        entry.rating = 3;
        entry.status = InstallStatus::Installed;

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("rating"));
        assert!(!json.contains("status"));

        let back: CatalogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rating, NO_RATING);
        assert_eq!(back.status, InstallStatus::NotInstalled);
    }
}
