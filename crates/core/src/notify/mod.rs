//! Outbound notification dispatch.
//!
//! The composer hands every rendered message to a [`Dispatcher`]. Delivery
//! failures propagate to the caller; nothing here retries.

pub mod email;

use async_trait::async_trait;

use crate::errors::NotificationError;

pub use email::SmtpDispatcher;

/// A fully rendered message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub message_id: String,
    /// Root Message-ID of the thread; absent for the root message itself.
    pub in_reply_to: Option<String>,
}

/// Sends rendered notifications.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, notification: &RenderedNotification) -> Result<(), NotificationError>;
}
