//! Message-ID derivation for discussion threads.
//!
//! Every discussion maps onto one mail thread. The creation notification gets
//! a deterministic root ID built from the discussion's node ID; everything
//! else gets a fresh ID and points `In-Reply-To` at the root.

use uuid::Uuid;

const NAMESPACE: &str = "ghd";
const DOMAIN: &str = "gitbox.apache.org";

/// Deterministic Message-ID of a discussion's root message.
pub fn root_id(node_id: &str) -> String {
    format!("<{}-{}@{}>", NAMESPACE, node_id, DOMAIN)
}

/// A fresh, unique Message-ID for a message in the thread of `node_id`.
pub fn reply_id(node_id: &str) -> String {
    format!("<{}-{}-{}@{}>", NAMESPACE, node_id, Uuid::new_v4(), DOMAIN)
}

/// The identity headers of one outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageIdentity {
    /// This message's own Message-ID.
    pub id: String,
    /// The thread root this message replies to; `None` for the root itself.
    pub parent_id: Option<String>,
}

impl MessageIdentity {
    /// Identity for the message announcing a new discussion.
    pub fn root(node_id: &str) -> Self {
        Self {
            id: root_id(node_id),
            parent_id: None,
        }
    }

    /// Identity for any later message in the discussion's thread.
    pub fn reply(node_id: &str) -> Self {
        Self {
            id: reply_id(node_id),
            parent_id: Some(root_id(node_id)),
        }
    }

    /// Pick root or reply identity. Only thread creation is the root.
    pub fn for_event(node_id: &str, is_thread_creation: bool) -> Self {
        if is_thread_creation {
            Self::root(node_id)
        } else {
            Self::reply(node_id)
        }
    }
}
