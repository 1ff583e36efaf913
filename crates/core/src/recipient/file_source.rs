//! YAML notification-settings reader.
//!
//! Each repository keeps its settings at
//! `<repo_root>/<repository>.git/notifications.yaml`:
//!
//! ```yaml
//! commits: commits@project.apache.org
//! discussions: dev@project.apache.org
//! ```
//!
//! Only the `discussions` key is read.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use super::{Recipient, RecipientSource};

const SETTINGS_FILE: &str = "notifications.yaml";

/// The fields of `notifications.yaml` we care about. Other keys are ignored.
#[derive(Debug, Deserialize)]
struct NotificationSettings {
    #[serde(default)]
    discussions: Option<serde_yaml::Value>,
}

/// Resolves recipients from per-repository YAML files on disk.
#[derive(Debug, Clone)]
pub struct FileRecipientSource {
    repo_root: PathBuf,
}

impl FileRecipientSource {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Path of the settings file for `repository`, or `None` if the name
    /// could escape the repository root.
    fn settings_path(&self, repository: &str) -> Option<PathBuf> {
        if repository.is_empty()
            || repository.contains(|c: char| c == '/' || c == '\\')
            || repository.starts_with('.')
        {
            return None;
        }
        Some(
            self.repo_root
                .join(format!("{}.git", repository))
                .join(SETTINGS_FILE),
        )
    }
}

impl RecipientSource for FileRecipientSource {
    fn resolve(&self, repository: &str) -> Option<Recipient> {
        let Some(path) = self.settings_path(repository) else {
            warn!(repository, "refusing to resolve recipient for suspicious repository name");
            return None;
        };
        read_discussions_address(&path)
    }
}

fn read_discussions_address(path: &Path) -> Option<Recipient> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no notification settings");
            return None;
        }
    };

    let settings: NotificationSettings = match serde_yaml::from_str(&contents) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed notification settings");
            return None;
        }
    };

    match settings.discussions {
        Some(serde_yaml::Value::String(address)) if !address.trim().is_empty() => {
            Some(Recipient::new(address.trim()))
        }
        Some(other) => {
            warn!(path = %path.display(), value = ?other, "discussions entry is not an address");
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_settings(root: &Path, repo: &str, yaml: &str) {
        let dir = root.join(format!("{}.git", repo));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SETTINGS_FILE), yaml).unwrap();
    }

    #[test]
    fn test_resolve_configured_repository() {
        let root = tempfile::tempdir().unwrap();
        write_settings(
            root.path(),
            "repo1",
            "commits: commits@example.org\ndiscussions: list@example.org\n",
        );

        let source = FileRecipientSource::new(root.path());
        assert_eq!(
            source.resolve("repo1"),
            Some(Recipient::new("list@example.org"))
        );
    }

    #[test]
    fn test_missing_file_is_none() {
        let root = tempfile::tempdir().unwrap();
        let source = FileRecipientSource::new(root.path());
        assert_eq!(source.resolve("repo1"), None);
    }

    #[test]
    fn test_missing_key_is_none() {
        let root = tempfile::tempdir().unwrap();
        write_settings(root.path(), "repo1", "commits: commits@example.org\n");
        let source = FileRecipientSource::new(root.path());
        assert_eq!(source.resolve("repo1"), None);
    }

    #[test]
    fn test_malformed_yaml_is_none() {
        let root = tempfile::tempdir().unwrap();
        write_settings(root.path(), "repo1", "discussions: [unterminated\n");
        let source = FileRecipientSource::new(root.path());
        assert_eq!(source.resolve("repo1"), None);
    }

    #[test]
    fn test_non_string_value_is_none() {
        let root = tempfile::tempdir().unwrap();
        write_settings(root.path(), "repo1", "discussions:\n  - a@example.org\n");
        let source = FileRecipientSource::new(root.path());
        assert_eq!(source.resolve("repo1"), None);
    }

    #[test]
    fn test_path_traversal_is_none() {
        let root = tempfile::tempdir().unwrap();
        let source = FileRecipientSource::new(root.path());
        assert_eq!(source.resolve("../etc"), None);
        assert_eq!(source.resolve("a/b"), None);
        assert_eq!(source.resolve(""), None);
    }
}
