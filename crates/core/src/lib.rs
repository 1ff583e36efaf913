//! discussmail core library.
//!
//! Translates discussion webhook events into list mail: origin checks,
//! event decoding, recipient lookup, Message-ID threading, template
//! rendering and SMTP dispatch.

pub mod composer;
pub mod config;
pub mod errors;
pub mod event;
pub mod message_id;
pub mod notify;
pub mod origin;
pub mod recipient;
pub mod template;

// Re-exports for convenience.
pub use composer::{Composer, Outcome};
pub use config::AppConfig;
pub use event::DiscussionEvent;
pub use origin::{OriginRanges, SharedOriginRanges};
pub use template::Templates;
