//! TOML-based configuration system for discussmail.
//!
//! Sensitive values (the SMTP password) are stored as `_env` fields that
//! reference environment variable names. The actual secrets are resolved at
//! runtime via [`AppConfig::resolve_env_vars`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::origin::parse_range;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// HTTP receiver settings.
    #[serde(default)]
    pub web: WebConfig,

    /// Webhook provider settings (origin ranges).
    #[serde(default)]
    pub github: GitHubConfig,

    /// Per-repository recipient lookup.
    #[serde(default)]
    pub recipients: RecipientsConfig,

    /// Notification template location.
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Outbound mail settings.
    #[serde(default)]
    pub mail: MailConfig,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Web receiver
// ---------------------------------------------------------------------------

/// HTTP receiver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Listen address (default `127.0.0.1:8084`).
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Use `X-Forwarded-For` as the origin address when present. Only safe
    /// behind a reverse proxy that sets the header.
    #[serde(default = "default_true")]
    pub trust_forwarded_for: bool,
}

fn default_listen() -> String {
    "127.0.0.1:8084".into()
}
fn default_true() -> bool {
    true
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            trust_forwarded_for: default_true(),
        }
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// Webhook provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Seconds between refreshes of the published hook ranges.
    #[serde(default = "default_range_refresh")]
    pub range_refresh_secs: u64,

    /// Extra CIDR ranges accepted in addition to the published ones.
    #[serde(default)]
    pub allowed_ranges: Vec<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_range_refresh() -> u64 {
    3600
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            range_refresh_secs: default_range_refresh(),
            allowed_ranges: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Recipients
// ---------------------------------------------------------------------------

/// Where per-repository `notifications.yaml` files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientsConfig {
    /// Directory holding `<repo>.git/notifications.yaml`.
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,
}

fn default_repo_root() -> PathBuf {
    PathBuf::from("/x1/repos/asf")
}

impl Default for RecipientsConfig {
    fn default() -> Self {
        Self {
            repo_root: default_repo_root(),
        }
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Template directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Directory containing `thread-action.txt` and `comment-action.txt`.
    #[serde(default = "default_template_dir")]
    pub dir: PathBuf,
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("templates")
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: default_template_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Mail
// ---------------------------------------------------------------------------

/// Outbound SMTP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// `From:` mailbox for every notification.
    #[serde(default = "default_sender")]
    pub sender: String,

    /// SMTP relay host.
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    /// SMTP relay port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Upgrade the connection with STARTTLS.
    #[serde(default)]
    pub starttls: bool,

    /// SMTP username, if the relay requires authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Environment variable holding the SMTP password.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Resolved SMTP password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub password: Option<String>,
}

fn default_sender() -> String {
    "GitBox <git@apache.org>".into()
}
fn default_smtp_host() -> String {
    "localhost".into()
}
fn default_smtp_port() -> u16 {
    25
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sender: default_sender(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            starttls: false,
            username: None,
            password_env: None,
            password: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `*_env` fields from environment variables.
    ///
    /// A missing variable logs a warning but does not fail.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.mail.password_env {
            self.mail.password = resolve_optional_env(env_name, "mail.password_env");
        }
        Ok(())
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web.listen.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "web.listen".into(),
                detail: format!("'{}' is not a socket address", self.web.listen),
            });
        }
        if let Err(e) = self.mail.sender.parse::<Mailbox>() {
            return Err(ConfigError::InvalidValue {
                field: "mail.sender".into(),
                detail: e.to_string(),
            });
        }
        if self.mail.smtp_host.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "mail.smtp_host".into(),
                detail: "SMTP host must not be empty".into(),
            });
        }
        if self.github.range_refresh_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "github.range_refresh_secs".into(),
                detail: "refresh interval must be > 0".into(),
            });
        }
        for range in &self.github.allowed_ranges {
            if parse_range(range).is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "github.allowed_ranges".into(),
                    detail: format!("'{}' is not a CIDR range or address", range),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
