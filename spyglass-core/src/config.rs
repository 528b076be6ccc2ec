//! Cache configuration

use std::time::Duration;

/// Default time-to-live for cached records.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
/// Default maximum number of records per cache.
pub const DEFAULT_MAX_ITEMS: usize = 1000;
/// Default interval between TTL cleanup sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
/// Default buffer size for single-shot result channels.
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// Configuration for one stream cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Time-to-live for cached records.
    pub ttl: Duration,
    /// Maximum number of records; the oldest record is evicted on overflow.
    pub max_items: usize,
    /// How often the cleanup task sweeps expired records.
    pub cleanup_interval: Duration,
    /// Buffer size for `get` result channels.
    pub buffer_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_items: DEFAULT_MAX_ITEMS,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the record TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the maximum number of records.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Set the cleanup sweep interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the result channel buffer size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Create a configuration for development/testing with short intervals.
    pub fn development() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_items: 100,
            cleanup_interval: Duration::from_secs(5),
            buffer_size: 16,
        }
    }

    /// Clamp zero values to usable minimums.
    ///
    /// All fields must be positive; a zeroed field is replaced with its
    /// default so a partially-built config cannot stall the cache.
    pub fn validated(mut self) -> Self {
        if self.ttl.is_zero() {
            self.ttl = DEFAULT_TTL;
        }
        if self.max_items == 0 {
            self.max_items = DEFAULT_MAX_ITEMS;
        }
        if self.cleanup_interval.is_zero() {
            self.cleanup_interval = DEFAULT_CLEANUP_INTERVAL;
        }
        if self.buffer_size == 0 {
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        self
    }
}
