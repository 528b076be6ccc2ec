//! SPYGLASS Cache - Reactive Stream Caching
//!
//! Turns request/response access to conversation-history entities into a
//! subscription model: a consumer asks for an entity or a filtered
//! collection and receives a long-lived stream that first emits the current
//! cached snapshot and then a new snapshot every time the underlying data
//! changes. Updates are driven by the Created/Updated/Deleted events the
//! persistence services publish.
//!
//! ## Architecture
//!
//! - [`StreamCache`] is the generic engine: one in-memory index per entity
//!   type with TTL eviction, capacity eviction, filter matching and
//!   per-subscriber snapshot delivery.
//! - [`SessionStream`] and [`MessageStream`] are typed facades adding
//!   domain filter shortcuts and delegating non-streaming operations to the
//!   underlying service.
//! - [`CacheManager`] owns the lifecycle: it builds one cache per entity
//!   type from the services' event subscriptions and aggregates statistics.
//!
//! The cache is a view, not a log: a slow consumer may miss intermediate
//! snapshots (single-slot coalescing), but the snapshot it eventually
//! receives is never stale.

mod entity;
mod manager;
mod matcher;
mod memory;
mod message;
mod pubsub;
mod service;
mod session;
mod stream_cache;

pub use entity::CacheEntity;
pub use manager::CacheManager;
pub use memory::{MemoryMessageService, MemorySessionService};
pub use message::MessageStream;
pub use pubsub::Broker;
pub use service::{
    MessageCreateParams, MessageService, SessionCreateParams, SessionService,
};
pub use session::SessionStream;
pub use stream_cache::{Snapshots, StreamCache};

// Re-export the shared value types so consumers need a single import.
pub use spyglass_core::{
    CacheConfig, CacheError, CacheResult, CacheStats, ChangeEvent, ChangeKind, Filter,
    FilterOperator, Message, MessageRole, Query, ServiceError, ServiceResult, Session,
    SortField,
};
