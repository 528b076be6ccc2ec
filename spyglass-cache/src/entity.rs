//! Cacheable entity trait and implementations
//!
//! The cache reads entities through this trait instead of runtime
//! reflection: each entity declares its identity and the set of filterable
//! fields, so the filterable surface is checked at compile time.

use serde::Serialize;
use serde_json::{json, Value};
use spyglass_core::{Message, Session};

/// Trait for types that can live in a stream cache.
///
/// # Implementation Requirements
///
/// - `id()` must return a stable, non-empty identity for the lifetime of
///   the entity; it is the cache's primary key.
/// - `field()` returns the semantic value of a named field, or `None` for
///   a field the entity does not expose. Absent optional values map to
///   `Value::Null`, which is distinct from an unknown field.
/// - Implementations must be `Clone + Serialize` (snapshots are hashed via
///   their serialized form) and `Send + Sync + 'static` for task handoff.
pub trait CacheEntity: Clone + Serialize + Send + Sync + 'static {
    /// The identity of this entity.
    fn id(&self) -> &str;

    /// Read a named field for filter evaluation.
    fn field(&self, name: &str) -> Option<Value>;
}

impl CacheEntity for Session {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(json!(self.id)),
            "parent_session_id" => Some(json!(self.parent_session_id)),
            "title" => Some(json!(self.title)),
            "message_count" => Some(json!(self.message_count)),
            "prompt_tokens" => Some(json!(self.prompt_tokens)),
            "completion_tokens" => Some(json!(self.completion_tokens)),
            "cost" => Some(json!(self.cost)),
            // RFC 3339 strings order chronologically under string comparison.
            "created_at" => Some(json!(self.created_at.to_rfc3339())),
            "updated_at" => Some(json!(self.updated_at.to_rfc3339())),
            _ => None,
        }
    }
}

impl CacheEntity for Message {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(json!(self.id)),
            "session_id" => Some(json!(self.session_id)),
            "parent_id" => Some(json!(self.parent_id)),
            "role" => Some(json!(self.role.as_str())),
            "content" => Some(json!(self.content)),
            "model" => Some(json!(self.model)),
            "created_at" => Some(json!(self.created_at.to_rfc3339())),
            "updated_at" => Some(json!(self.updated_at.to_rfc3339())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spyglass_core::MessageRole;

    #[test]
    fn test_session_fields() {
        let session = Session::new("s1", "Fix flaky test").with_parent("root");

        assert_eq!(session.id(), "s1");
        assert_eq!(session.field("title"), Some(json!("Fix flaky test")));
        assert_eq!(session.field("parent_session_id"), Some(json!("root")));
        assert_eq!(session.field("message_count"), Some(json!(0)));
        assert_eq!(session.field("no_such_field"), None);
    }

    #[test]
    fn test_absent_option_is_null_not_unknown() {
        let session = Session::new("s1", "Top level");
        assert_eq!(session.field("parent_session_id"), Some(Value::Null));
    }

    #[test]
    fn test_message_fields() {
        let message = Message::new("m1", "s1", MessageRole::Assistant, "done")
            .with_model("sonnet");

        assert_eq!(message.id(), "m1");
        assert_eq!(message.field("session_id"), Some(json!("s1")));
        assert_eq!(message.field("role"), Some(json!("assistant")));
        assert_eq!(message.field("model"), Some(json!("sonnet")));
        assert_eq!(message.field("tool_calls"), None);
    }
}
