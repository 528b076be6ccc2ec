//! Session streaming facade

use std::sync::Arc;

use spyglass_core::{CacheResult, Filter, Query, ServiceResult, Session};
use tokio::sync::mpsc;

use crate::service::{SessionCreateParams, SessionService};
use crate::stream_cache::{Snapshots, StreamCache};

/// Streaming view over sessions, wrapping the session cache and delegating
/// non-streaming operations to the underlying service.
pub struct SessionStream<S: SessionService> {
    service: Arc<S>,
    cache: Arc<StreamCache<Session>>,
}

impl<S: SessionService> SessionStream<S> {
    /// Wrap a service and its cache.
    pub fn new(service: Arc<S>, cache: Arc<StreamCache<Session>>) -> Self {
        Self { service, cache }
    }

    /// Stream one session by id: emits the cached value (or a miss) once.
    pub fn stream_get(&self, id: &str) -> mpsc::Receiver<CacheResult<Session>> {
        self.cache.get(id)
    }

    /// Stream all sessions.
    pub fn stream_list(&self) -> Snapshots<Vec<Session>> {
        self.cache.list(Vec::new())
    }

    /// Stream the sessions spawned by a given parent session.
    pub fn stream_list_by_parent(&self, parent_id: &str) -> Snapshots<Vec<Session>> {
        self.cache
            .list(vec![Filter::eq("parent_session_id", parent_id)])
    }

    /// Stream a query over sessions.
    pub fn stream_query(&self, query: Query) -> Snapshots<Vec<Session>> {
        self.cache.query(query)
    }

    // ------------------------------------------------------------------
    // Delegated service operations
    // ------------------------------------------------------------------

    pub async fn get(&self, id: &str) -> ServiceResult<Session> {
        self.service.get(id).await
    }

    pub async fn list(&self) -> ServiceResult<Vec<Session>> {
        self.service.list().await
    }

    pub async fn create(&self, params: SessionCreateParams) -> ServiceResult<Session> {
        self.service.create(params).await
    }

    pub async fn update(&self, session: Session) -> ServiceResult<Session> {
        self.service.update(session).await
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        self.service.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySessionService;
    use spyglass_core::CacheConfig;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next(
        stream: &mut Snapshots<Vec<Session>>,
    ) -> CacheResult<Vec<Session>> {
        timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("stream closed unexpectedly")
    }

    fn facade() -> SessionStream<MemorySessionService> {
        let service = Arc::new(MemorySessionService::new());
        let cache = Arc::new(StreamCache::new(
            CacheConfig::development(),
            service.subscribe(),
        ));
        SessionStream::new(service, cache)
    }

    #[tokio::test]
    async fn test_create_flows_into_stream() {
        let sessions = facade();
        let mut stream = sessions.stream_list();
        let initial = next(&mut stream).await;
        assert_eq!(initial.data.map(|d| d.len()), Some(0));

        let created = sessions
            .create(SessionCreateParams {
                title: "Investigate crash".to_string(),
                parent_session_id: None,
            })
            .await
            .expect("create");

        let snapshot = next(&mut stream).await;
        let data = snapshot.data.expect("snapshot data");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].id, created.id);
    }

    #[tokio::test]
    async fn test_by_parent_filters_children() {
        let sessions = facade();

        let parent = sessions
            .create(SessionCreateParams {
                title: "Parent".to_string(),
                parent_session_id: None,
            })
            .await
            .expect("create parent");

        let mut stream = sessions.stream_list_by_parent(&parent.id);
        let initial = next(&mut stream).await;
        assert_eq!(initial.data.map(|d| d.len()), Some(0));

        let child = sessions
            .create(SessionCreateParams {
                title: "Child".to_string(),
                parent_session_id: Some(parent.id.clone()),
            })
            .await
            .expect("create child");

        // An unrelated top-level session must not show up.
        sessions
            .create(SessionCreateParams {
                title: "Unrelated".to_string(),
                parent_session_id: None,
            })
            .await
            .expect("create unrelated");

        let snapshot = next(&mut stream).await;
        let data = snapshot.data.expect("snapshot data");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].id, child.id);
    }

    #[tokio::test]
    async fn test_stream_get_after_create() {
        let sessions = facade();
        let created = sessions
            .create(SessionCreateParams {
                title: "Lookup".to_string(),
                parent_session_id: None,
            })
            .await
            .expect("create");

        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = sessions
            .stream_get(&created.id)
            .recv()
            .await
            .expect("one value");
        assert!(result.cached);
        assert_eq!(result.data.map(|s| s.id), Some(created.id));
    }
}
