use crate::error::CacheError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Contract for the shared key-value store the memoization layer sits in
/// front of.
///
/// Implementations are expected to be thin clients over an externally hosted
/// store (memcached, Redis, ...) shared by many independent processes. The
/// contract is intentionally minimal:
///
/// * values are opaque, binary-safe byte strings;
/// * keys are at most [`MAX_KEY_LENGTH`](crate::MAX_KEY_LENGTH) bytes after
///   sanitization — the layer never hands a longer key to a backend;
/// * `physical_ttl == None` means "store without expiry" (used for group
///   tokens);
/// * no atomic compare-and-swap is assumed; `add` (create-if-absent) is the
///   only conditional primitive and is used for token creation.
///
/// All operations are synchronous, blocking calls. Connectivity and timeout
/// handling belongs to the backend client; errors surface unchanged as
/// [`CacheError::Backend`].
pub trait CacheBackend: Send + Sync {
    /// Fetches the value stored under `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `value` under `key`, overwriting any existing value.
    fn set(&self, key: &str, value: Vec<u8>, physical_ttl: Option<Duration>)
        -> Result<(), CacheError>;

    /// Stores `value` under `key` only if the key is currently absent.
    ///
    /// Returns `true` if the value was stored.
    fn add(&self, key: &str, value: Vec<u8>, physical_ttl: Option<Duration>)
        -> Result<bool, CacheError>;

    /// Removes `key`. Deleting an absent key is a no-op, not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(bytes: Vec<u8>, physical_ttl: Option<Duration>) -> Self {
        Self {
            bytes,
            expires_at: physical_ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| Instant::now() >= at)
    }
}

/// In-process [`CacheBackend`] honoring the full contract, including physical
/// TTL expiry and `add` semantics.
///
/// Plays the role a local memcached instance plays for the hosted deployments:
/// it lets the whole layer (mint semantics, group tokens, entity registry) be
/// exercised hermetically in tests and embedded setups. Expired values are
/// reclaimed lazily on the next `get` of their key; there is no background
/// sweep.
///
/// # Examples
///
/// ```
/// use mintcache::{CacheBackend, MemoryBackend};
///
/// let backend = MemoryBackend::new();
/// backend.set("greeting", b"hello".to_vec(), None).unwrap();
/// assert_eq!(backend.get("greeting").unwrap(), Some(b"hello".to_vec()));
///
/// // `add` refuses to overwrite a live value
/// assert!(!backend.add("greeting", b"other".to_vec(), None).unwrap());
///
/// backend.delete("greeting").unwrap();
/// assert_eq!(backend.get("greeting").unwrap(), None);
/// ```
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredValue>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every stored value, live or expired.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored values, counting expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let expired = match self.entries.get(key) {
            Some(stored) if !stored.is_expired() => return Ok(Some(stored.bytes.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, stored| stored.is_expired());
        }
        Ok(None)
    }

    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        physical_ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, physical_ttl));
        Ok(())
    }

    fn add(
        &self,
        key: &str,
        value: Vec<u8>,
        physical_ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(StoredValue::new(value, physical_ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, physical_ttl));
                Ok(true)
            }
        }
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
