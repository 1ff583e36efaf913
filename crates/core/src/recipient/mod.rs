//! Per-repository recipient resolution.
//!
//! A repository opts in to discussion mail by naming a list address in its
//! notification settings. Repositories without one are skipped silently.

pub mod file_source;

use std::fmt;

pub use file_source::FileRecipientSource;

/// The list address notifications for one repository are sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient(String);

impl Recipient {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The list's unsubscribe address: `-unsubscribe` inserted before the `@`.
    pub fn unsubscribe_address(&self) -> String {
        self.0.replace('@', "-unsubscribe@")
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Looks up the recipient configured for a repository.
///
/// Absence is a normal outcome; implementations never fail.
pub trait RecipientSource: Send + Sync {
    fn resolve(&self, repository: &str) -> Option<Recipient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsubscribe_address() {
        let r = Recipient::new("dev@project.apache.org");
        assert_eq!(r.unsubscribe_address(), "dev-unsubscribe@project.apache.org");
        assert_eq!(r.to_string(), "dev@project.apache.org");
    }
}
