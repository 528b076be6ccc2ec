//! Persistence service contracts
//!
//! The cache never writes; consumers mutate through these services and the
//! cache reacts to the resulting change events. `subscribe` must emit one
//! event per successful mutation performed through the same service
//! instance, in per-id mutation order.

use async_trait::async_trait;
use spyglass_core::{
    ChangeEvent, Message, MessageRole, ServiceResult, Session,
};
use tokio::sync::broadcast;

/// Parameters for creating a session.
#[derive(Debug, Clone, Default)]
pub struct SessionCreateParams {
    pub title: String,
    pub parent_session_id: Option<String>,
}

/// Parameters for creating a message.
#[derive(Debug, Clone)]
pub struct MessageCreateParams {
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub parent_id: Option<String>,
    pub model: Option<String>,
}

/// Blocking (request/response) session persistence plus event subscription.
#[async_trait]
pub trait SessionService: Send + Sync + 'static {
    /// Fetch one session by id.
    async fn get(&self, id: &str) -> ServiceResult<Session>;

    /// List all sessions.
    async fn list(&self) -> ServiceResult<Vec<Session>>;

    /// Create a session and publish a Created event.
    async fn create(&self, params: SessionCreateParams) -> ServiceResult<Session>;

    /// Persist an updated session and publish an Updated event.
    async fn update(&self, session: Session) -> ServiceResult<Session>;

    /// Delete a session and publish a Deleted event.
    async fn delete(&self, id: &str) -> ServiceResult<()>;

    /// Subscribe to this service's change events.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<Session>>;
}

/// Blocking (request/response) message persistence plus event subscription.
#[async_trait]
pub trait MessageService: Send + Sync + 'static {
    /// Fetch one message by id.
    async fn get(&self, id: &str) -> ServiceResult<Message>;

    /// List the messages of one session.
    async fn list(&self, session_id: &str) -> ServiceResult<Vec<Message>>;

    /// Create a message and publish a Created event.
    async fn create(&self, params: MessageCreateParams) -> ServiceResult<Message>;

    /// Persist an updated message and publish an Updated event.
    async fn update(&self, message: Message) -> ServiceResult<Message>;

    /// Delete a message and publish a Deleted event.
    async fn delete(&self, id: &str) -> ServiceResult<()>;

    /// Subscribe to this service's change events.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<Message>>;
}
