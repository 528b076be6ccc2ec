//! Result envelope and cache statistics

use crate::error::CacheError;
use chrono::{DateTime, Utc};

/// Envelope around a snapshot delivered to a subscriber.
///
/// `cached` is true iff the snapshot was served from the in-memory index.
/// `version` is the cache state version the snapshot reflects; versions on
/// one channel never decrease.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<D> {
    pub data: Option<D>,
    pub error: Option<CacheError>,
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
    pub version: i64,
}

impl<D> CacheResult<D> {
    /// A snapshot served from the index.
    pub fn hit(data: D, timestamp: DateTime<Utc>, version: i64) -> Self {
        Self {
            data: Some(data),
            error: None,
            cached: true,
            timestamp,
            version,
        }
    }

    /// A miss: the requested record is not in the index.
    pub fn miss() -> Self {
        Self {
            data: None,
            error: Some(CacheError::Miss),
            cached: false,
            timestamp: Utc::now(),
            version: 0,
        }
    }

    /// Whether this result is a cache miss.
    pub fn is_miss(&self) -> bool {
        matches!(self.error, Some(CacheError::Miss))
    }

    /// Consume the envelope, returning the payload if any.
    pub fn into_data(self) -> Option<D> {
        self.data
    }
}

/// Point-in-time statistics for one cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of `get` calls served from the index.
    pub hit_count: u64,
    /// Number of `get` calls that missed.
    pub miss_count: u64,
    /// Number of records currently in the index.
    pub item_count: u64,
    /// Approximate memory held by the index, in bytes.
    pub memory_bytes: u64,
    /// When the cleanup task last swept, if it has.
    pub last_cleanup: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
