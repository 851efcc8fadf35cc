use crate::backend::CacheBackend;
use crate::error::CacheError;
use crate::group_store::{GroupStore, MINT_DELAY};
use crate::keys::ToArgs;
use crate::memoizer::{MemoConfig, Memoizer};
use crate::registry::InvalidationRegistry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Process-wide cache configuration, fixed at context construction.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prepended to every derived key; isolates multiple logical deployments
    /// sharing one physical backend.
    pub version_prefix: String,
    /// Grace window after logical expiry during which a stale value is still
    /// served while exactly one caller recomputes.
    pub mint_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version_prefix: String::new(),
            mint_delay: MINT_DELAY,
        }
    }
}

impl CacheConfig {
    pub fn version_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.version_prefix = prefix.into();
        self
    }

    pub fn mint_delay(mut self, delay: Duration) -> Self {
        self.mint_delay = delay;
        self
    }
}

/// Root object tying the store and the registry to one shared backend.
///
/// Constructed once at process start and handed to every binding site; its
/// lifetime belongs to the host application's root scope. There are no
/// module-level singletons anywhere in this crate.
///
/// The context is also the integration point for entity-mutation events: the
/// host wires whatever signal or message system it uses to call
/// [`invalidate_entity`](Self::invalidate_entity) after persisting an
/// instance of a registered kind.
///
/// # Examples
///
/// ```
/// use mintcache::{CacheConfig, CacheContext, MemoConfig, MemoryBackend};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let ctx = CacheContext::new(
///     Arc::new(MemoryBackend::new()),
///     CacheConfig::default().version_prefix("v3::"),
/// );
///
/// let lookup = ctx.memoize(
///     "users.display_name",
///     MemoConfig::new(Duration::from_secs(120)).entity_kinds(["User"]),
///     |&(id,): &(u64,)| format!("user-{id}"),
/// );
///
/// assert_eq!(lookup.call(&(7,)).unwrap(), "user-7");
///
/// // host's post-save hook for User instances:
/// ctx.invalidate_entity("User").unwrap();
/// assert!(lookup.require_cache(&(7,)).is_err());
/// ```
pub struct CacheContext {
    store: GroupStore,
    registry: Arc<InvalidationRegistry>,
}

impl CacheContext {
    /// Builds a context over `backend`.
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        let store = GroupStore::new(backend, config.version_prefix, config.mint_delay);
        let registry = Arc::new(InvalidationRegistry::new(store.clone()));
        Self { store, registry }
    }

    /// The underlying mint-cache store, for direct key/value use.
    pub fn store(&self) -> &GroupStore {
        &self.store
    }

    /// The entity-kind invalidation registry.
    pub fn registry(&self) -> &InvalidationRegistry {
        &self.registry
    }

    /// Binds `func` to the cache under `identity` with the given per-binding
    /// configuration.
    pub fn memoize<A, R, F>(
        &self,
        identity: &str,
        config: MemoConfig,
        func: F,
    ) -> Memoizer<A, R, F>
    where
        A: ToArgs,
        R: Serialize + DeserializeOwned,
        F: Fn(&A) -> R,
    {
        Memoizer::new(
            identity,
            config,
            self.store.clone(),
            Arc::clone(&self.registry),
            func,
        )
    }

    /// Entity-mutation entry point: drops every cached entry ever registered
    /// under `kind`. Returns how many keys were deleted.
    pub fn invalidate_entity(&self, kind: &str) -> Result<usize, CacheError> {
        self.registry.invalidate(kind)
    }

    /// Rotates the token of `group`, orphaning every entry written under it.
    pub fn invalidate_group(&self, group: &str) -> Result<(), CacheError> {
        self.store.invalidate_group(group)
    }
}
