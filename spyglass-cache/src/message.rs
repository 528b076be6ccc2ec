//! Message streaming facade

use std::sync::Arc;

use serde_json::json;
use spyglass_core::{CacheResult, Filter, Message, MessageRole, Query, ServiceResult};
use tokio::sync::mpsc;

use crate::service::{MessageCreateParams, MessageService};
use crate::stream_cache::{Snapshots, StreamCache};

/// Streaming view over messages, wrapping the message cache and delegating
/// non-streaming operations to the underlying service.
pub struct MessageStream<M: MessageService> {
    service: Arc<M>,
    cache: Arc<StreamCache<Message>>,
}

impl<M: MessageService> MessageStream<M> {
    /// Wrap a service and its cache.
    pub fn new(service: Arc<M>, cache: Arc<StreamCache<Message>>) -> Self {
        Self { service, cache }
    }

    /// Stream one message by id: emits the cached value (or a miss) once.
    pub fn stream_get(&self, id: &str) -> mpsc::Receiver<CacheResult<Message>> {
        self.cache.get(id)
    }

    /// Stream the messages of one session.
    ///
    /// This session-scoped list shadows the unfiltered form; use
    /// [`stream_list_all`](Self::stream_list_all) for every message.
    pub fn stream_list(&self, session_id: &str) -> Snapshots<Vec<Message>> {
        self.cache.list(vec![Filter::eq("session_id", session_id)])
    }

    /// Stream all messages regardless of session.
    pub fn stream_list_all(&self) -> Snapshots<Vec<Message>> {
        self.cache.list(Vec::new())
    }

    /// Stream the messages replying to a given parent message.
    pub fn stream_list_by_parent(&self, parent_id: &str) -> Snapshots<Vec<Message>> {
        self.cache.list(vec![Filter::eq("parent_id", parent_id)])
    }

    /// Stream one session's messages with a given role.
    pub fn stream_list_by_role(
        &self,
        session_id: &str,
        role: MessageRole,
    ) -> Snapshots<Vec<Message>> {
        self.cache.list(vec![
            Filter::eq("session_id", session_id),
            Filter::eq("role", json!(role.as_str())),
        ])
    }

    /// Stream a query over messages.
    pub fn stream_query(&self, query: Query) -> Snapshots<Vec<Message>> {
        self.cache.query(query)
    }

    // ------------------------------------------------------------------
    // Delegated service operations
    // ------------------------------------------------------------------

    pub async fn get(&self, id: &str) -> ServiceResult<Message> {
        self.service.get(id).await
    }

    pub async fn list(&self, session_id: &str) -> ServiceResult<Vec<Message>> {
        self.service.list(session_id).await
    }

    pub async fn create(&self, params: MessageCreateParams) -> ServiceResult<Message> {
        self.service.create(params).await
    }

    pub async fn update(&self, message: Message) -> ServiceResult<Message> {
        self.service.update(message).await
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        self.service.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMessageService;
    use spyglass_core::CacheConfig;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next(
        stream: &mut Snapshots<Vec<Message>>,
    ) -> CacheResult<Vec<Message>> {
        timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("stream closed unexpectedly")
    }

    fn facade() -> MessageStream<MemoryMessageService> {
        let service = Arc::new(MemoryMessageService::new());
        let cache = Arc::new(StreamCache::new(
            CacheConfig::development(),
            service.subscribe(),
        ));
        MessageStream::new(service, cache)
    }

    fn params(session_id: &str, role: MessageRole, content: &str) -> MessageCreateParams {
        MessageCreateParams {
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            parent_id: None,
            model: None,
        }
    }

    #[tokio::test]
    async fn test_stream_list_is_session_scoped() {
        let messages = facade();
        let mut stream = messages.stream_list("s1");
        let initial = next(&mut stream).await;
        assert_eq!(initial.data.map(|d| d.len()), Some(0));

        messages
            .create(params("s1", MessageRole::User, "in scope"))
            .await
            .expect("create");
        messages
            .create(params("s2", MessageRole::User, "out of scope"))
            .await
            .expect("create");

        let snapshot = next(&mut stream).await;
        let data = snapshot.data.expect("snapshot data");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].session_id, "s1");
    }

    #[tokio::test]
    async fn test_by_role_is_and_of_session_and_role() {
        let messages = facade();
        let mut stream = messages.stream_list_by_role("s1", MessageRole::User);
        let _ = next(&mut stream).await;

        messages
            .create(params("s1", MessageRole::User, "keep"))
            .await
            .expect("create");
        messages
            .create(params("s1", MessageRole::Assistant, "wrong role"))
            .await
            .expect("create");
        messages
            .create(params("s2", MessageRole::User, "wrong session"))
            .await
            .expect("create");

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = next(&mut stream).await;
        let data = snapshot.data.expect("snapshot data");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].content, "keep");
    }

    #[tokio::test]
    async fn test_by_parent_tracks_replies() {
        let messages = facade();
        let root = messages
            .create(params("s1", MessageRole::User, "question"))
            .await
            .expect("create root");

        let mut stream = messages.stream_list_by_parent(&root.id);
        let initial = next(&mut stream).await;
        assert_eq!(initial.data.map(|d| d.len()), Some(0));

        let mut reply = params("s1", MessageRole::Assistant, "answer");
        reply.parent_id = Some(root.id.clone());
        messages.create(reply).await.expect("create reply");

        let snapshot = next(&mut stream).await;
        let data = snapshot.data.expect("snapshot data");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].parent_id.as_deref(), Some(root.id.as_str()));
    }
}
