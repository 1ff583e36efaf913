//! Typed discussion webhook events.
//!
//! Payloads are decoded once at the boundary into [`DiscussionEvent`]; the
//! rest of the pipeline never inspects raw JSON. The `action` string is kept
//! verbatim so that unknown actions can be reported and skipped rather than
//! rejected as malformed.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::errors::EventError;

// ---------------------------------------------------------------------------
// Actions and kinds
// ---------------------------------------------------------------------------

/// Actions that produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Created,
    Edited,
    Deleted,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "edited" => Some(Self::Edited),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Edited => "edited",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const THREAD_ACTIONS: &[Action] = &[Action::Created, Action::Edited, Action::Deleted];
const COMMENT_ACTIONS: &[Action] = &[Action::Created, Action::Edited, Action::Deleted];

/// Whether an event is about the discussion post or one of its comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Thread,
    Comment,
}

impl EventKind {
    /// Actions that are notified for this kind of event.
    pub fn valid_actions(&self) -> &'static [Action] {
        match self {
            Self::Thread => THREAD_ACTIONS,
            Self::Comment => COMMENT_ACTIONS,
        }
    }
}

// ---------------------------------------------------------------------------
// Event model
// ---------------------------------------------------------------------------

/// The discussion an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discussion {
    /// Stable across every event of the same discussion.
    pub node_id: String,
    pub title: String,
    pub category_slug: String,
    pub html_url: String,
    pub body: String,
    pub author: String,
}

/// A comment on a discussion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub html_url: String,
    pub body: String,
    pub author: String,
}

/// A discussion was created, edited, or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadEvent {
    pub action: String,
    pub repository: String,
    pub discussion: Discussion,
}

/// A comment on a discussion was created, edited, or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEvent {
    pub action: String,
    pub repository: String,
    pub discussion: Discussion,
    pub comment: Comment,
}

/// A decoded discussion webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscussionEvent {
    Thread(ThreadEvent),
    Comment(CommentEvent),
}

impl DiscussionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Thread(_) => EventKind::Thread,
            Self::Comment(_) => EventKind::Comment,
        }
    }

    /// The raw action string as delivered.
    pub fn action(&self) -> &str {
        match self {
            Self::Thread(e) => &e.action,
            Self::Comment(e) => &e.action,
        }
    }

    /// The action, if it is one this kind of event is notified for.
    pub fn valid_action(&self) -> Option<Action> {
        Action::parse(self.action()).filter(|a| self.kind().valid_actions().contains(a))
    }

    pub fn repository(&self) -> &str {
        match self {
            Self::Thread(e) => &e.repository,
            Self::Comment(e) => &e.repository,
        }
    }

    pub fn discussion(&self) -> &Discussion {
        match self {
            Self::Thread(e) => &e.discussion,
            Self::Comment(e) => &e.discussion,
        }
    }

    /// Login of whoever wrote the thing this event is about.
    pub fn actor(&self) -> &str {
        match self {
            Self::Thread(e) => &e.discussion.author,
            Self::Comment(e) => &e.comment.author,
        }
    }

    /// URL of the discussion, or of the comment for comment events.
    pub fn url(&self) -> &str {
        match self {
            Self::Thread(e) => &e.discussion.html_url,
            Self::Comment(e) => &e.comment.html_url,
        }
    }

    /// Body text of the discussion, or of the comment for comment events.
    pub fn body(&self) -> &str {
        match self {
            Self::Thread(e) => &e.discussion.body,
            Self::Comment(e) => &e.comment.body,
        }
    }

    /// Only the creation of the discussion itself starts a mail thread.
    pub fn is_thread_creation(&self) -> bool {
        matches!(self, Self::Thread(e) if e.action == Action::Created.as_str())
    }

    /// Decode a raw webhook body.
    pub fn from_slice(body: &[u8]) -> Result<Option<Self>, EventError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        Self::from_value(&value)
    }

    /// Decode a parsed webhook payload.
    ///
    /// Returns `Ok(None)` when the payload is not about a discussion at all.
    /// A `comment` key next to `discussion` makes it a comment event.
    pub fn from_value(value: &serde_json::Value) -> Result<Option<Self>, EventError> {
        let Some(raw_discussion) = value.get("discussion") else {
            return Ok(None);
        };

        let action: String = field(value, "action")?;
        let repository: RawRepository = field(value, "repository")?;
        let discussion: Discussion = decode::<RawDiscussion>(raw_discussion, "discussion")?.into();

        let event = match value.get("comment") {
            Some(raw_comment) => {
                let comment: Comment = decode::<RawComment>(raw_comment, "comment")?.into();
                Self::Comment(CommentEvent {
                    action,
                    repository: repository.name,
                    discussion,
                    comment,
                })
            }
            None => Self::Thread(ThreadEvent {
                action,
                repository: repository.name,
                discussion,
            }),
        };
        Ok(Some(event))
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawDiscussion {
    node_id: String,
    title: String,
    category: RawCategory,
    html_url: String,
    #[serde(default)]
    body: Option<String>,
    user: RawUser,
}

impl From<RawDiscussion> for Discussion {
    fn from(raw: RawDiscussion) -> Self {
        Self {
            node_id: raw.node_id,
            title: raw.title,
            category_slug: raw.category.slug,
            html_url: raw.html_url,
            body: raw.body.unwrap_or_default(),
            author: raw.user.login,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawComment {
    html_url: String,
    #[serde(default)]
    body: Option<String>,
    user: RawUser,
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        Self {
            html_url: raw.html_url,
            body: raw.body.unwrap_or_default(),
            author: raw.user.login,
        }
    }
}

fn field<T: DeserializeOwned>(value: &serde_json::Value, name: &str) -> Result<T, EventError> {
    let raw = value.get(name).ok_or_else(|| EventError::Malformed {
        field: name.to_string(),
        detail: "missing".into(),
    })?;
    decode(raw, name)
}

fn decode<T: DeserializeOwned>(raw: &serde_json::Value, name: &str) -> Result<T, EventError> {
    T::deserialize(raw).map_err(|e| EventError::Malformed {
        field: name.to_string(),
        detail: e.to_string(),
    })
}
