//! Cache manager - lifecycle owner of all stream caches
//!
//! The manager builds one stream cache per entity type from the services'
//! event subscriptions, exposes the typed facades while running, and tears
//! everything down on stop. `start` and `stop` are idempotent; `start`
//! after `stop` builds fresh, empty caches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use spyglass_core::{CacheConfig, CacheStats, Message, Session};
use tracing::{debug, info};

use crate::message::MessageStream;
use crate::service::{MessageService, SessionService};
use crate::session::SessionStream;
use crate::stream_cache::StreamCache;

/// Stats key for the session cache.
pub const SESSIONS_CACHE: &str = "sessions";
/// Stats key for the message cache.
pub const MESSAGES_CACHE: &str = "messages";

struct RunningCaches<S: SessionService, M: MessageService> {
    session_cache: Arc<StreamCache<Session>>,
    message_cache: Arc<StreamCache<Message>>,
    sessions: Arc<SessionStream<S>>,
    messages: Arc<MessageStream<M>>,
}

/// Coordinates the per-entity caches and their facades.
pub struct CacheManager<S: SessionService, M: MessageService> {
    config: CacheConfig,
    session_service: Arc<S>,
    message_service: Arc<M>,
    running: Mutex<Option<RunningCaches<S, M>>>,
}

impl<S: SessionService, M: MessageService> CacheManager<S, M> {
    /// Create a manager in the uninitialised state.
    pub fn new(session_service: Arc<S>, message_service: Arc<M>, config: CacheConfig) -> Self {
        Self {
            config: config.validated(),
            session_service,
            message_service,
            running: Mutex::new(None),
        }
    }

    /// Build and wire the caches. A second call while running is a no-op.
    ///
    /// Must be called from within a Tokio runtime. A freshly started cache
    /// is empty until real events arrive.
    pub fn start(&self) {
        let mut running = self.lock_running();
        if running.is_some() {
            debug!("cache manager already started");
            return;
        }

        let session_cache = Arc::new(StreamCache::new(
            self.config.clone(),
            self.session_service.subscribe(),
        ));
        let message_cache = Arc::new(StreamCache::new(
            self.config.clone(),
            self.message_service.subscribe(),
        ));

        let sessions = Arc::new(SessionStream::new(
            Arc::clone(&self.session_service),
            Arc::clone(&session_cache),
        ));
        let messages = Arc::new(MessageStream::new(
            Arc::clone(&self.message_service),
            Arc::clone(&message_cache),
        ));

        *running = Some(RunningCaches {
            session_cache,
            message_cache,
            sessions,
            messages,
        });
        info!("cache manager started");
    }

    /// Close all caches. A second call while stopped is a no-op.
    pub fn stop(&self) {
        let stopped = self.lock_running().take();
        if let Some(caches) = stopped {
            caches.session_cache.close();
            caches.message_cache.close();
            info!("cache manager stopped");
        }
    }

    /// Whether the manager is currently running.
    pub fn is_started(&self) -> bool {
        self.lock_running().is_some()
    }

    /// The session facade, if running.
    pub fn sessions(&self) -> Option<Arc<SessionStream<S>>> {
        self.lock_running().as_ref().map(|r| Arc::clone(&r.sessions))
    }

    /// The message facade, if running.
    pub fn messages(&self) -> Option<Arc<MessageStream<M>>> {
        self.lock_running().as_ref().map(|r| Arc::clone(&r.messages))
    }

    /// Per-cache statistics, keyed by entity name. Empty when stopped.
    pub fn stats(&self) -> HashMap<String, CacheStats> {
        let mut stats = HashMap::new();
        if let Some(caches) = self.lock_running().as_ref() {
            stats.insert(SESSIONS_CACHE.to_string(), caches.session_cache.stats());
            stats.insert(MESSAGES_CACHE.to_string(), caches.message_cache.stats());
        }
        stats
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningCaches<S, M>>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: SessionService, M: MessageService> Drop for CacheManager<S, M> {
    fn drop(&mut self) {
        self.stop();
    }
}
