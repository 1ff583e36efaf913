//! Error types for the discussmail core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Origin(#[from] OriginError),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Event decoding errors
// ---------------------------------------------------------------------------

/// Errors raised while decoding an inbound webhook payload.
#[derive(Debug, Error)]
pub enum EventError {
    /// The body was not valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A required field was absent or had the wrong type.
    #[error("malformed discussion payload at '{field}': {detail}")]
    Malformed { field: String, detail: String },
}

// ---------------------------------------------------------------------------
// Template errors
// ---------------------------------------------------------------------------

/// Errors from loading and compiling notification templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template text has no subject/body delimiter.
    #[error("template '{name}' has no '--' delimiter between subject and body")]
    MissingDelimiter { name: String },

    /// A variable is not known, or not allowed for this template kind.
    #[error("template '{name}' uses unknown placeholder '{placeholder}'")]
    UnknownPlaceholder { name: String, placeholder: String },

    /// The subject or body failed to compile.
    #[error("template '{name}' failed to compile: {source}")]
    Syntax {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// Rendering failed at runtime.
    #[error("template '{name}' failed to render: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// The template file could not be read.
    #[error("failed to read template '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Origin range errors
// ---------------------------------------------------------------------------

/// Errors from fetching or parsing the permitted webhook origin ranges.
#[derive(Debug, Error)]
pub enum OriginError {
    /// HTTP-level transport error talking to the meta endpoint.
    #[error("origin range HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The meta endpoint returned a non-success status code.
    #[error("meta endpoint returned HTTP {status}: {body}")]
    ApiError { status: u16, body: String },

    /// The meta response did not contain any usable range.
    #[error("meta endpoint returned no usable hook ranges")]
    NoRanges,

    /// A configured range is not a valid CIDR or address.
    #[error("invalid network range '{0}'")]
    InvalidRange(String),
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

/// Errors from the outbound mail dispatcher.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Building or sending the email failed.
    #[error("email notification failed: {0}")]
    EmailError(String),

    /// An address could not be parsed as a mailbox.
    #[error("invalid mailbox '{address}': {detail}")]
    InvalidMailbox { address: String, detail: String },
}
