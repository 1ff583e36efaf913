//! Email dispatcher via SMTP.
//!
//! Uses the `lettre` crate to send plain-text list mail with explicit
//! `Message-ID` and `In-Reply-To` headers so clients thread replies under the
//! discussion's root message.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info, warn};

use super::{Dispatcher, RenderedNotification};
use crate::config::MailConfig;
use crate::errors::NotificationError;

/// SMTP dispatcher.
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpDispatcher {
    /// Build a dispatcher from the mail configuration.
    pub fn new(config: &MailConfig) -> Result<Self, NotificationError> {
        info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            starttls = config.starttls,
            "initializing SMTP dispatcher"
        );

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host).map_err(
                |e| NotificationError::EmailError(format!("SMTP connection error: {}", e)),
            )?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        let mut builder = builder.port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Dispatcher for SmtpDispatcher {
    async fn send(&self, notification: &RenderedNotification) -> Result<(), NotificationError> {
        debug!(
            to = %notification.recipient,
            message_id = %notification.message_id,
            "sending email"
        );

        let email = build_message(notification)?;

        match self.transport.send(email).await {
            Ok(_) => {
                info!(to = %notification.recipient, "email sent successfully");
                Ok(())
            }
            Err(e) => {
                warn!(to = %notification.recipient, error = %e, "failed to send email");
                Err(NotificationError::EmailError(format!(
                    "SMTP send to '{}' failed: {}",
                    notification.recipient, e
                )))
            }
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| NotificationError::InvalidMailbox {
            address: address.to_string(),
            detail: e.to_string(),
        })
}

/// Build the MIME message for a notification.
pub fn build_message(notification: &RenderedNotification) -> Result<Message, NotificationError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&notification.sender)?)
        .to(parse_mailbox(&notification.recipient)?)
        .subject(notification.subject.as_str())
        .message_id(Some(notification.message_id.clone()))
        .header(ContentType::TEXT_PLAIN);

    if let Some(ref parent) = notification.in_reply_to {
        builder = builder
            .in_reply_to(parent.clone())
            .references(parent.clone());
    }

    builder
        .body(notification.body.clone())
        .map_err(|e| NotificationError::EmailError(format!("failed to build email: {}", e)))
}
