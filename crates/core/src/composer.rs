//! Turns discussion events into threaded list mail.
//!
//! One event at a time: validate the action, resolve the repository's list
//! address, derive Message-IDs, render the matching template and hand the
//! result to the dispatcher. The returned [`Outcome`] carries the one-line
//! record written to the operational log.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, instrument};

use crate::errors::{CoreError, NotificationError, TemplateError};
use crate::event::{Action, DiscussionEvent, EventKind};
use crate::message_id::MessageIdentity;
use crate::notify::{Dispatcher, RenderedNotification};
use crate::recipient::{Recipient, RecipientSource};
use crate::template::{RenderContext, Templates};

/// Why an event did not produce a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The action is not notified for this kind of event.
    InvalidAction,
    /// The repository has no discussions recipient configured.
    NoRecipient,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAction => write!(f, "invalid_action"),
            Self::NoRecipient => write!(f, "no_recipient"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Sent { message_id: String },
    Skipped(SkipReason),
}

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: OutcomeStatus,
    /// `[send] ...` or `[skip] ...` log line.
    pub line: String,
}

impl Outcome {
    pub fn is_sent(&self) -> bool {
        matches!(self.status, OutcomeStatus::Sent { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Phrase used in comment notifications for each action.
pub fn action_phrase(action: &str) -> &'static str {
    match Action::parse(action) {
        Some(Action::Created) => "added a comment to the discussion:",
        Some(Action::Edited) => "edited a comment on the discussion:",
        Some(Action::Deleted) => "deleted a comment on the discussion:",
        None => "???",
    }
}

/// The event-to-mail engine.
pub struct Composer {
    templates: Arc<Templates>,
    recipients: Arc<dyn RecipientSource>,
    dispatcher: Arc<dyn Dispatcher>,
    sender: String,
}

impl Composer {
    pub fn new(
        templates: Arc<Templates>,
        recipients: Arc<dyn RecipientSource>,
        dispatcher: Arc<dyn Dispatcher>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            templates,
            recipients,
            dispatcher,
            sender: sender.into(),
        }
    }

    /// Process one event. Render and transport errors are returned, not retried.
    #[instrument(skip(self, event), fields(repo = %event.repository(), action = %event.action()))]
    pub async fn process(&self, event: &DiscussionEvent) -> Result<Outcome, CoreError> {
        if event.valid_action().is_none() {
            debug!("action not notified");
            return Ok(skipped(event, SkipReason::InvalidAction));
        }

        let Some(recipient) = self.resolve_recipient(event.repository()).await else {
            debug!("no discussions recipient configured");
            return Ok(skipped(event, SkipReason::NoRecipient));
        };

        let notification = self.render(event, &recipient)?;
        self.dispatcher.send(&notification).await?;

        Ok(Outcome {
            status: OutcomeStatus::Sent {
                message_id: notification.message_id,
            },
            line: outcome_line("send", event),
        })
    }

    /// Recipient sources may block on file I/O, so lookups run on the
    /// blocking pool.
    async fn resolve_recipient(&self, repository: &str) -> Option<Recipient> {
        let recipients = Arc::clone(&self.recipients);
        let repository = repository.to_string();
        match tokio::task::spawn_blocking(move || recipients.resolve(&repository)).await {
            Ok(recipient) => recipient,
            Err(e) => {
                error!(error = %e, "recipient lookup task failed");
                None
            }
        }
    }

    /// Render the notification for `event` addressed to `recipient`.
    pub fn render(
        &self,
        event: &DiscussionEvent,
        recipient: &Recipient,
    ) -> Result<RenderedNotification, TemplateError> {
        let discussion = event.discussion();
        let identity = MessageIdentity::for_event(&discussion.node_id, event.is_thread_creation());
        let unsub = recipient.unsubscribe_address();
        let action_human = match event.kind() {
            EventKind::Comment => action_phrase(event.action()),
            EventKind::Thread => "",
        };

        let ctx = RenderContext {
            user: event.actor(),
            title: &discussion.title,
            category: &discussion.category_slug,
            url: event.url(),
            body: event.body(),
            recipient: recipient.as_str(),
            unsub: &unsub,
            action: event.action(),
            action_human,
            repo: event.repository(),
            node_id: &discussion.node_id,
        };
        let text = self.templates.for_kind(event.kind()).render(&ctx)?;

        Ok(RenderedNotification {
            sender: self.sender.clone(),
            recipient: recipient.to_string(),
            subject: text.subject,
            body: text.body,
            message_id: identity.id,
            in_reply_to: identity.parent_id,
        })
    }
}

fn skipped(event: &DiscussionEvent, reason: SkipReason) -> Outcome {
    Outcome {
        status: OutcomeStatus::Skipped(reason),
        line: outcome_line("skip", event),
    }
}

fn outcome_line(verb: &str, event: &DiscussionEvent) -> String {
    let tag = match event.kind() {
        EventKind::Comment => " [comment]",
        EventKind::Thread => "",
    };
    format!(
        "[{}]{} {} {} {}: {}",
        verb,
        tag,
        event.actor(),
        event.action(),
        event.url(),
        event.discussion().title
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Comment, CommentEvent, Discussion, ThreadEvent};
    use crate::message_id::root_id;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedRecipients(Option<&'static str>);

    impl RecipientSource for FixedRecipients {
        fn resolve(&self, _repository: &str) -> Option<Recipient> {
            self.0.map(Recipient::new)
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<RenderedNotification>>,
    }

    #[async_trait]
    impl Dispatcher for Recorder {
        async fn send(&self, n: &RenderedNotification) -> Result<(), NotificationError> {
            self.sent.lock().unwrap().push(n.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Dispatcher for Failing {
        async fn send(&self, _n: &RenderedNotification) -> Result<(), NotificationError> {
            Err(NotificationError::EmailError("relay down".into()))
        }
    }

    fn templates() -> Arc<Templates> {
        Arc::new(
            Templates::from_strings(
                "{{ user }} {{ action }}: {{ title }}\n--\n{{ body }}\n{{ url }}\n{{ category }}\n{{ unsub }}",
                "Re: {{ title }}\n--\n{{ user }} {{ action_human }} {{ title }}\n{{ body }}\n{{ url }}",
            )
            .unwrap(),
        )
    }

    fn discussion() -> Discussion {
        Discussion {
            node_id: "D1".into(),
            title: "Q".into(),
            category_slug: "general".into(),
            html_url: "http://x/1".into(),
            body: "hi".into(),
            author: "alice".into(),
        }
    }

    fn thread(action: &str) -> DiscussionEvent {
        DiscussionEvent::Thread(ThreadEvent {
            action: action.into(),
            repository: "repo1".into(),
            discussion: discussion(),
        })
    }

    fn comment(action: &str) -> DiscussionEvent {
        DiscussionEvent::Comment(CommentEvent {
            action: action.into(),
            repository: "repo1".into(),
            discussion: discussion(),
            comment: Comment {
                html_url: "http://x/2".into(),
                body: "me too".into(),
                author: "bob".into(),
            },
        })
    }

    fn composer(
        recipient: Option<&'static str>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Composer {
        Composer::new(
            templates(),
            Arc::new(FixedRecipients(recipient)),
            dispatcher,
            "GitBox <git@apache.org>",
        )
    }

    #[tokio::test]
    async fn test_thread_creation_uses_root_identity() {
        let recorder = Arc::new(Recorder::default());
        let c = composer(Some("list@example.org"), recorder.clone());

        let outcome = c.process(&thread("created")).await.unwrap();
        assert_eq!(outcome.line, "[send] alice created http://x/1: Q");

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_id, root_id("D1"));
        assert_eq!(sent[0].in_reply_to, None);
        assert_eq!(sent[0].subject, "alice created: Q");
        assert_eq!(
            sent[0].body,
            "hi\nhttp://x/1\ngeneral\nlist-unsubscribe@example.org"
        );
        assert_eq!(sent[0].sender, "GitBox <git@apache.org>");
        assert_eq!(sent[0].recipient, "list@example.org");
    }

    #[tokio::test]
    async fn test_thread_edit_replies_to_root() {
        let recorder = Arc::new(Recorder::default());
        let c = composer(Some("list@example.org"), recorder.clone());

        let outcome = c.process(&thread("edited")).await.unwrap();
        assert!(outcome.is_sent());

        let sent = recorder.sent.lock().unwrap();
        assert_ne!(sent[0].message_id, root_id("D1"));
        assert!(sent[0].message_id.starts_with("<ghd-D1-"));
        assert_eq!(sent[0].in_reply_to.as_deref(), Some(root_id("D1").as_str()));
    }

    #[tokio::test]
    async fn test_comment_events_reply_to_root() {
        let recorder = Arc::new(Recorder::default());
        let c = composer(Some("list@example.org"), recorder.clone());

        for action in ["created", "edited", "deleted"] {
            let outcome = c.process(&comment(action)).await.unwrap();
            assert_eq!(
                outcome.line,
                format!("[send] [comment] bob {} http://x/2: Q", action)
            );
        }

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        for n in sent.iter() {
            assert_eq!(n.in_reply_to.as_deref(), Some(root_id("D1").as_str()));
            assert_eq!(n.subject, "Re: Q");
        }
        assert_ne!(sent[0].message_id, sent[1].message_id);
        assert_eq!(
            sent[1].body,
            "bob edited a comment on the discussion: Q\nme too\nhttp://x/2"
        );
    }

    #[tokio::test]
    async fn test_invalid_action_is_skipped() {
        let recorder = Arc::new(Recorder::default());
        let c = composer(Some("list@example.org"), recorder.clone());

        let outcome = c.process(&thread("closed")).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Skipped(SkipReason::InvalidAction));
        assert_eq!(outcome.line, "[skip] alice closed http://x/1: Q");

        let outcome = c.process(&comment("pinned")).await.unwrap();
        assert_eq!(outcome.line, "[skip] [comment] bob pinned http://x/2: Q");
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_recipient_is_skipped() {
        let recorder = Arc::new(Recorder::default());
        let c = composer(None, recorder.clone());

        let outcome = c.process(&thread("created")).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Skipped(SkipReason::NoRecipient));
        assert_eq!(outcome.to_string(), "[skip] alice created http://x/1: Q");
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let c = composer(Some("list@example.org"), Arc::new(Failing));
        let err = c.process(&thread("created")).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Notification(NotificationError::EmailError(_))
        ));
    }

    #[tokio::test]
    async fn test_render_failure_propagates_without_sending() {
        let recorder = Arc::new(Recorder::default());
        let templates = Templates::from_strings(
            "{{ title + 1 }}\n--\n{{ body }}",
            "Re: {{ title }}\n--\n{{ body }}",
        )
        .unwrap();
        let c = Composer::new(
            Arc::new(templates),
            Arc::new(FixedRecipients(Some("list@example.org"))),
            recorder.clone(),
            "GitBox <git@apache.org>",
        );

        let err = c.process(&thread("created")).await.unwrap_err();
        assert!(matches!(err, CoreError::Template(TemplateError::Render { .. })));
        assert!(recorder.sent.lock().unwrap().is_empty());

        assert!(c.process(&comment("created")).await.unwrap().is_sent());
    }

    struct ThreadRecordingRecipients {
        seen_on: Mutex<Option<std::thread::ThreadId>>,
    }

    impl RecipientSource for ThreadRecordingRecipients {
        fn resolve(&self, _repository: &str) -> Option<Recipient> {
            *self.seen_on.lock().unwrap() = Some(std::thread::current().id());
            Some(Recipient::new("list@example.org"))
        }
    }

    #[tokio::test]
    async fn test_recipient_lookup_runs_on_blocking_pool() {
        let recipients = Arc::new(ThreadRecordingRecipients {
            seen_on: Mutex::new(None),
        });
        let recorder = Arc::new(Recorder::default());
        let c = Composer::new(
            templates(),
            recipients.clone(),
            recorder.clone(),
            "GitBox <git@apache.org>",
        );

        assert!(c.process(&thread("created")).await.unwrap().is_sent());

        let seen_on = recipients.seen_on.lock().unwrap().unwrap();
        assert_ne!(seen_on, std::thread::current().id());
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_action_phrases() {
        assert_eq!(action_phrase("created"), "added a comment to the discussion:");
        assert_eq!(action_phrase("edited"), "edited a comment on the discussion:");
        assert_eq!(action_phrase("deleted"), "deleted a comment on the discussion:");
        assert_eq!(action_phrase("closed"), "???");
    }
}
