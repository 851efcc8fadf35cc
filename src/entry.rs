use serde::{Deserialize, Serialize};

/// Wire representation of a cached value together with its mint-cache
/// bookkeeping.
///
/// Every value written through [`GroupStore`](crate::GroupStore) is wrapped in
/// a `CacheEntry` before being serialized into the backend. The entry carries
/// two deadlines:
///
/// * the *logical* deadline `refresh_at` (unix seconds), after which the value
///   is considered stale, and
/// * the *physical* TTL handed to the backend, which is always
///   `logical ttl + mint_delay` so that a stale value survives long enough to
///   be served while exactly one caller recomputes it.
///
/// The `refreshed` flag records that some caller has already observed
/// staleness and is recomputing: a stale entry with `refreshed == true` is
/// served as a hit, bounding the number of concurrent recomputations of one
/// key to a small constant.
///
/// # Examples
///
/// ```
/// use mintcache::CacheEntry;
///
/// let entry = CacheEntry::new("report", 1_700_000_000.0);
/// assert!(!entry.refreshed);
/// assert!(!entry.is_stale(1_699_999_999.0));
/// assert!(entry.is_stale(1_700_000_000.0));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub value: V,
    pub refresh_at: f64,
    pub refreshed: bool,
}

impl<V> CacheEntry<V> {
    /// Creates a fresh (unflagged) entry with the given logical deadline.
    pub fn new(value: V, refresh_at: f64) -> Self {
        Self {
            value,
            refresh_at,
            refreshed: false,
        }
    }

    /// Returns true once the logical deadline has passed.
    pub fn is_stale(&self, now: f64) -> bool {
        now >= self.refresh_at
    }
}
