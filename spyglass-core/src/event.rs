//! Change events announced by the persistence services
//!
//! Every successful mutation through a service publishes one `ChangeEvent`
//! carrying the complete post-mutation entity value. The cache treats these
//! payloads as snapshots of truth; it never fetches on ingest.

use serde::{Deserialize, Serialize};

/// Kind of mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// The event kind as a string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// A change event: what happened, and the full entity value it happened to.
///
/// For `Deleted` events the payload is the last known value of the entity;
/// only its identity is consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<T> {
    pub kind: ChangeKind,
    pub payload: T,
}

impl<T> ChangeEvent<T> {
    /// Create a new change event.
    pub fn new(kind: ChangeKind, payload: T) -> Self {
        Self { kind, payload }
    }

    /// Map the payload to a different type.
    pub fn map_payload<Q, F: FnOnce(T) -> Q>(self, f: F) -> ChangeEvent<Q> {
        ChangeEvent {
            kind: self.kind,
            payload: f(self.payload),
        }
    }
}
