//! Types for project and conversation management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DocumentId, MessageId, ProjectId};

/// Kind of an attached document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// A file whose bytes were read and encoded.
    File,
    /// A pasted web link.
    Link,
}

/// A normalized unit of attached context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier.
    pub id: DocumentId,
    /// Document kind.
    pub kind: DocumentKind,
    /// Display name (file name or URL).
    pub name: String,
    /// Declared MIME type. Links carry `text/uri-list`.
    pub mime_type: String,
    /// Base64-encoded bytes for files; the raw URL string for links.
    pub data: String,
    /// Size in bytes. Always 0 for links.
    pub size: u64,
}

/// Role of a chat message author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The local user.
    User,
    /// The generative backend.
    Model,
    /// Local system notices.
    System,
}

/// A backend-supplied web source consulted to produce an answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingReference {
    /// Source title.
    pub title: String,
    /// Source URI.
    pub uri: String,
}

/// A message in a conversation. Never mutated after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier.
    pub id: MessageId,
    /// Author role.
    pub role: Role,
    /// Message text.
    pub text: String,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Whether this message records a failed turn.
    #[serde(default)]
    pub is_error: bool,
    /// Web sources the backend consulted for this message.
    #[serde(default)]
    pub grounding: Vec<GroundingReference>,
}

impl ChatMessage {
    /// Create a user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create a model message with grounding references.
    #[must_use]
    pub fn model(text: impl Into<String>, grounding: Vec<GroundingReference>) -> Self {
        Self {
            grounding,
            ..Self::new(Role::Model, text)
        }
    }

    /// Create a model message that records a failed turn.
    #[must_use]
    pub fn model_error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::new(Role::Model, text)
        }
    }

    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            is_error: false,
            grounding: Vec::new(),
        }
    }
}

/// An isolated conversation plus its attached documents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Ordered conversation history.
    pub messages: Vec<ChatMessage>,
    /// Ordered attached documents.
    pub documents: Vec<Document>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last mutation.
    pub updated_at: DateTime<Utc>,
    /// Reserved for cross-project context sharing. Stored and toggled, not
    /// yet consumed by turn composition.
    #[serde(default)]
    pub cross_memory: bool,
}

impl Project {
    /// Create an empty project. A missing name derives one from the
    /// creation date.
    #[must_use]
    pub fn new(name: Option<&str>) -> Self {
        let now = Utc::now();
        let name = match name {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => format!("Project {}", now.format("%Y-%m-%d")),
        };
        Self {
            id: ProjectId::new(),
            name,
            messages: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
            cross_memory: false,
        }
    }
}
