//! Conversation-history entity structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used across all entities.
pub type Timestamp = DateTime<Utc>;

/// Session - a top-level conversation container.
///
/// Sessions may nest: a task spawned from within a conversation gets its own
/// session with `parent_session_id` pointing at the spawning one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub parent_session_id: Option<String>,
    pub title: String,
    pub message_count: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cost: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Session {
    /// Create a new session with the given id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            parent_session_id: None,
            title: title.into(),
            message_count: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the parent session id.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_session_id = Some(parent_id.into());
        self
    }
}

/// Role of a message within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    /// The lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
            MessageRole::Tool => "tool",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message - one turn of a conversation, owned by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub parent_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub model: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Message {
    /// Create a new message in the given session.
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            session_id: session_id.into(),
            parent_id: None,
            role,
            content: content.into(),
            model: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the parent message id.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the model that produced this message.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_builder() {
        let session = Session::new("s1", "Refactor parser").with_parent("root");
        assert_eq!(session.id, "s1");
        assert_eq!(session.parent_session_id.as_deref(), Some("root"));
        assert_eq!(session.message_count, 0);
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(MessageRole::User.as_str(), "user");
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");

        let json = serde_json::to_string(&MessageRole::Tool).expect("serialize role");
        assert_eq!(json, "\"tool\"");
    }

    #[test]
    fn test_message_serialization_roundtrip() {
        let message = Message::new("m1", "s1", MessageRole::User, "hello")
            .with_model("sonnet");

        let json = serde_json::to_string(&message).expect("serialize message");
        let back: Message = serde_json::from_str(&json).expect("deserialize message");
        assert_eq!(message, back);
    }
}
