use crate::backend::CacheBackend;
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::keys::{sanitize_key, MAX_KEY_LENGTH};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

/// Upper bound on how long any cached value should take to be recomputed.
///
/// Doubles as the grace window after logical expiry during which a stale
/// value is still served while exactly one caller recomputes, and as the
/// slack added to every physical TTL.
pub const MINT_DELAY: Duration = Duration::from_secs(30);

/// Infix between the version prefix and a group name in group-index keys.
const GROUP_INDEX_INFIX: &str = "_group::";

/// Dog-pile-preventing wrapper over a plain get/set/delete key-value backend.
///
/// `GroupStore` adds three behaviors on top of the raw [`CacheBackend`]:
///
/// * **Stale-value serving (mint cache)**: every entry carries a logical
///   deadline and a `refreshed` flag. The first caller to observe a stale
///   entry flips the flag and reports a miss (it is expected to recompute and
///   `set`); every other caller arriving within the next [`MINT_DELAY`]
///   receives the slightly stale value as a hit. Exactly one caller pays the
///   recomputation cost regardless of request rate.
/// * **O(1) group invalidation**: keys written under a named group
///   incorporate a per-group indirection token. [`invalidate_group`] deletes
///   only the token; every previously written entry becomes unreachable and
///   ages out via its own physical TTL. No key enumeration ever happens.
/// * **Key-length safety**: every final key passes through
///   [`sanitize_key`](crate::sanitize_key) before reaching the backend.
///
/// The flag flip is not atomic against concurrent `get`s: two callers can
/// both observe an unflagged stale entry and both recompute. That race is
/// accepted; the worst case is a handful of redundant recomputations, never
/// an unbounded storm.
///
/// # Examples
///
/// ```
/// use mintcache::{GroupStore, MemoryBackend, MINT_DELAY};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let store = GroupStore::new(Arc::new(MemoryBackend::new()), "v1", MINT_DELAY);
/// store.set("vasia", &"foo", Duration::from_secs(60), Some("names")).unwrap();
/// let hit: Option<String> = store.get("vasia", Some("names")).unwrap();
/// assert_eq!(hit.as_deref(), Some("foo"));
///
/// store.invalidate_group("names").unwrap();
/// let miss: Option<String> = store.get("vasia", Some("names")).unwrap();
/// assert_eq!(miss, None);
/// ```
#[derive(Clone)]
pub struct GroupStore {
    backend: Arc<dyn CacheBackend>,
    version_prefix: String,
    mint_delay: Duration,
}

impl GroupStore {
    /// Creates a store over `backend`.
    ///
    /// `version_prefix` isolates multiple logical deployments sharing one
    /// physical backend; it is prepended to every key, group-index key and
    /// entity-index key this store derives.
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        version_prefix: impl Into<String>,
        mint_delay: Duration,
    ) -> Self {
        Self {
            backend,
            version_prefix: version_prefix.into(),
            mint_delay,
        }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub(crate) fn version_prefix(&self) -> &str {
        &self.version_prefix
    }

    fn unix_now() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    /// Fetches the value under `key`, applying the mint state machine.
    ///
    /// * absent (never written or physically expired) — miss;
    /// * fresh — hit;
    /// * stale and unflagged — the entry is rewritten with `refreshed = true`
    ///   and a physical TTL of `mint_delay`, and a miss is reported to this
    ///   caller only, which is expected to recompute and [`set`](Self::set);
    /// * stale and flagged — the stale value is served as a hit.
    pub fn get<V>(&self, key: &str, group: Option<&str>) -> Result<Option<V>, CacheError>
    where
        V: Serialize + DeserializeOwned,
    {
        let full_key = self.make_key(group, key)?;
        let Some(bytes) = self.backend.get(&full_key)? else {
            debug!(key = %full_key, "cache miss");
            return Ok(None);
        };

        let entry: CacheEntry<V> = serde_json::from_slice(&bytes)?;
        if entry.is_stale(Self::unix_now()) && !entry.refreshed {
            // Keep serving the stale value to everyone else while this
            // caller recomputes.
            let flagged = CacheEntry {
                value: entry.value,
                refresh_at: entry.refresh_at,
                refreshed: true,
            };
            let payload = serde_json::to_vec(&flagged)?;
            self.backend
                .set(&full_key, payload, Some(self.mint_delay))?;
            debug!(key = %full_key, "cache stale, flagged for refresh");
            return Ok(None);
        }

        debug!(key = %full_key, "cache hit");
        Ok(Some(entry.value))
    }

    /// Writes `value` under `key` with logical TTL `ttl`.
    ///
    /// The backend receives a physical TTL of `ttl + mint_delay`; the extra
    /// window is what keeps a stale value servable while it is being
    /// recomputed.
    pub fn set<V: Serialize>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
        group: Option<&str>,
    ) -> Result<(), CacheError> {
        let full_key = self.make_key(group, key)?;
        self.write(&full_key, value, ttl)?;
        debug!(key = %full_key, "cache set");
        Ok(())
    }

    /// Writes `value` under `key` only if the key is currently absent.
    ///
    /// Returns `true` if the value was stored.
    pub fn add<V: Serialize>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
        group: Option<&str>,
    ) -> Result<bool, CacheError> {
        let full_key = self.make_key(group, key)?;
        let entry = CacheEntry::new(value, Self::unix_now() + ttl.as_secs_f64());
        let payload = serde_json::to_vec(&entry)?;
        self.backend.add(&full_key, payload, Some(ttl + self.mint_delay))
    }

    fn write<V: Serialize>(
        &self,
        full_key: &str,
        value: &V,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(value, Self::unix_now() + ttl.as_secs_f64());
        let payload = serde_json::to_vec(&entry)?;
        self.backend
            .set(full_key, payload, Some(ttl + self.mint_delay))
    }

    /// Removes the entry under `key`. Absent keys are a no-op.
    pub fn delete(&self, key: &str, group: Option<&str>) -> Result<(), CacheError> {
        let full_key = self.make_key(group, key)?;
        self.backend.delete(&full_key)?;
        debug!(key = %full_key, "cache delete");
        Ok(())
    }

    /// Invalidates every key belonging to `group` by rotating its token.
    ///
    /// O(1) regardless of how many keys the group has: only the group-index
    /// key is deleted. Existing entries are not touched; they become
    /// unreachable and are reclaimed by the backend's physical-TTL expiry.
    pub fn invalidate_group(&self, group: &str) -> Result<(), CacheError> {
        self.backend.delete(&self.group_index_key(group))?;
        debug!(group, "group invalidated");
        Ok(())
    }

    /// Derives the final backend key for `key`, incorporating the group token
    /// when a group is set.
    pub fn make_key(&self, group: Option<&str>, key: &str) -> Result<String, CacheError> {
        let versioned = format!("{}{}", self.version_prefix, key);
        let full = match group {
            Some(group) => format!("{}:{}-{}", group, versioned, self.group_token(group)?),
            None => versioned,
        };
        Ok(sanitize_key(&full, MAX_KEY_LENGTH))
    }

    fn group_index_key(&self, group: &str) -> String {
        format!("{}{}{}", self.version_prefix, GROUP_INDEX_INFIX, group)
    }

    /// Fetches the group token, creating it on first use.
    ///
    /// Creation goes through the backend's `add` so a rotation racing with
    /// first use costs at most one spurious miss for one key; an entry is
    /// never served under a token it was not written with.
    fn group_token(&self, group: &str) -> Result<String, CacheError> {
        let index_key = self.group_index_key(group);
        if let Some(bytes) = self.backend.get(&index_key)? {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }

        let token = Uuid::new_v4().to_string();
        if self.backend.add(&index_key, token.clone().into_bytes(), None)? {
            return Ok(token);
        }

        // Lost the creation race; adopt whichever token won.
        match self.backend.get(&index_key)? {
            Some(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            None => Ok(token),
        }
    }

    /// Not supported: incrementing a mint-wrapped value is meaningless.
    pub fn incr(&self, _key: &str, _delta: i64) -> Result<i64, CacheError> {
        Err(CacheError::Unsupported("incr"))
    }

    /// Not supported: decrementing a mint-wrapped value is meaningless.
    pub fn decr(&self, _key: &str, _delta: i64) -> Result<i64, CacheError> {
        Err(CacheError::Unsupported("decr"))
    }

    /// Not supported: batch gets cannot share one group-token fetch without
    /// a redesign of the value format.
    pub fn get_many(&self, _keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        Err(CacheError::Unsupported("get_many"))
    }
}
