//! In-memory service implementations
//!
//! Hash-map backed implementations of the service contracts, publishing
//! change events through a [`Broker`]. They are the store used by tests and
//! by in-process consumers that do not need durable persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use spyglass_core::{
    ChangeEvent, ChangeKind, Message, ServiceError, ServiceResult, Session,
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::pubsub::Broker;
use crate::service::{
    MessageCreateParams, MessageService, SessionCreateParams, SessionService,
};

fn lock_poisoned() -> ServiceError {
    ServiceError::Storage {
        reason: "store lock poisoned".to_string(),
    }
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct MemorySessionService {
    sessions: RwLock<HashMap<String, Session>>,
    broker: Broker<Session>,
}

impl MemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionService for MemorySessionService {
    async fn get(&self, id: &str) -> ServiceResult<Session> {
        let sessions = self.sessions.read().map_err(|_| lock_poisoned())?;
        sessions.get(id).cloned().ok_or_else(|| ServiceError::NotFound {
            id: id.to_string(),
        })
    }

    async fn list(&self) -> ServiceResult<Vec<Session>> {
        let sessions = self.sessions.read().map_err(|_| lock_poisoned())?;
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn create(&self, params: SessionCreateParams) -> ServiceResult<Session> {
        let mut session = Session::new(Uuid::new_v4().to_string(), params.title);
        session.parent_session_id = params.parent_session_id;
        {
            let mut sessions = self.sessions.write().map_err(|_| lock_poisoned())?;
            sessions.insert(session.id.clone(), session.clone());
        }
        self.broker.publish(ChangeKind::Created, session.clone());
        Ok(session)
    }

    async fn update(&self, mut session: Session) -> ServiceResult<Session> {
        session.updated_at = Utc::now();
        {
            let mut sessions = self.sessions.write().map_err(|_| lock_poisoned())?;
            if !sessions.contains_key(&session.id) {
                return Err(ServiceError::NotFound {
                    id: session.id.clone(),
                });
            }
            sessions.insert(session.id.clone(), session.clone());
        }
        self.broker.publish(ChangeKind::Updated, session.clone());
        Ok(session)
    }

    async fn delete(&self, id: &str) -> ServiceResult<()> {
        let removed = {
            let mut sessions = self.sessions.write().map_err(|_| lock_poisoned())?;
            sessions.remove(id)
        };
        let session = removed.ok_or_else(|| ServiceError::NotFound {
            id: id.to_string(),
        })?;
        self.broker.publish(ChangeKind::Deleted, session);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<Session>> {
        self.broker.subscribe()
    }
}

/// In-memory message store.
#[derive(Debug, Default)]
pub struct MemoryMessageService {
    messages: RwLock<HashMap<String, Message>>,
    broker: Broker<Message>,
}

impl MemoryMessageService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageService for MemoryMessageService {
    async fn get(&self, id: &str) -> ServiceResult<Message> {
        let messages = self.messages.read().map_err(|_| lock_poisoned())?;
        messages.get(id).cloned().ok_or_else(|| ServiceError::NotFound {
            id: id.to_string(),
        })
    }

    async fn list(&self, session_id: &str) -> ServiceResult<Vec<Message>> {
        let messages = self.messages.read().map_err(|_| lock_poisoned())?;
        let mut scoped: Vec<Message> = messages
            .values()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        scoped.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(scoped)
    }

    async fn create(&self, params: MessageCreateParams) -> ServiceResult<Message> {
        let mut message = Message::new(
            Uuid::new_v4().to_string(),
            params.session_id,
            params.role,
            params.content,
        );
        message.parent_id = params.parent_id;
        message.model = params.model;
        {
            let mut messages = self.messages.write().map_err(|_| lock_poisoned())?;
            messages.insert(message.id.clone(), message.clone());
        }
        self.broker.publish(ChangeKind::Created, message.clone());
        Ok(message)
    }

    async fn update(&self, mut message: Message) -> ServiceResult<Message> {
        message.updated_at = Utc::now();
        {
            let mut messages = self.messages.write().map_err(|_| lock_poisoned())?;
            if !messages.contains_key(&message.id) {
                return Err(ServiceError::NotFound {
                    id: message.id.clone(),
                });
            }
            messages.insert(message.id.clone(), message.clone());
        }
        self.broker.publish(ChangeKind::Updated, message.clone());
        Ok(message)
    }

    async fn delete(&self, id: &str) -> ServiceResult<()> {
        let removed = {
            let mut messages = self.messages.write().map_err(|_| lock_poisoned())?;
            messages.remove(id)
        };
        let message = removed.ok_or_else(|| ServiceError::NotFound {
            id: id.to_string(),
        })?;
        self.broker.publish(ChangeKind::Deleted, message);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<Message>> {
        self.broker.subscribe()
    }
}
