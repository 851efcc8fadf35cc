use crate::error::CacheError;
use crate::group_store::GroupStore;
use crate::keys::{derive_key, hashed_key, sanitize_key, CallKind, ToArgs, MAX_KEY_LENGTH};
use crate::registry::InvalidationRegistry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Per-binding configuration, immutable once the computation is bound.
///
/// # Examples
///
/// ```
/// use mintcache::{CallKind, MemoConfig};
/// use std::time::Duration;
///
/// let config = MemoConfig::new(Duration::from_secs(300))
///     .group("reports")
///     .entity_kinds(["Order"])
///     .call_kind(CallKind::Plain);
/// ```
#[derive(Debug, Clone)]
pub struct MemoConfig {
    pub(crate) ttl: Duration,
    pub(crate) group: Option<String>,
    pub(crate) key_override: Option<String>,
    pub(crate) entity_kinds: Vec<String>,
    pub(crate) call_kind: CallKind,
    pub(crate) hashed_keys: bool,
}

impl MemoConfig {
    /// Configuration with the given logical TTL and everything else unset.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            group: None,
            key_override: None,
            entity_kinds: Vec::new(),
            call_kind: CallKind::Plain,
            hashed_keys: false,
        }
    }

    /// Tags every entry with `group`, enabling O(1) bulk invalidation via
    /// [`CacheContext::invalidate_group`](crate::CacheContext::invalidate_group).
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Substitutes `key` for the binding's identity during key derivation.
    ///
    /// Arguments still participate; use this when the identity alone should
    /// be controlled externally (for hand-managed invalidation tooling).
    pub fn key_override(mut self, key: impl Into<String>) -> Self {
        self.key_override = Some(key.into());
        self
    }

    /// Registers every produced key under each of `kinds` for
    /// entity-triggered bulk invalidation.
    pub fn entity_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Declares how the computation receives its arguments; `Method` and
    /// `Associated` strip the leading receiver argument from the key.
    pub fn call_kind(mut self, kind: CallKind) -> Self {
        self.call_kind = kind;
        self
    }

    /// Switches key derivation to hashed mode: keys become md5 digests of
    /// the canonical form instead of readable strings.
    pub fn hashed_keys(mut self, on: bool) -> Self {
        self.hashed_keys = on;
        self
    }
}

/// A computation bound to the cache: the memoization/invalidation façade.
///
/// Binds a callable, its stable identity string and a [`MemoConfig`] to a
/// [`GroupStore`] and [`InvalidationRegistry`] once; every operation then
/// derives keys the same way, so `call`, `invalidate`, `force_recalc`,
/// `require_cache` and `get_cache_key` always agree on which entry they talk
/// about.
///
/// Constructed through
/// [`CacheContext::memoize`](crate::CacheContext::memoize).
///
/// # Examples
///
/// ```
/// use mintcache::{CacheConfig, CacheContext, MemoConfig, MemoryBackend};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let ctx = CacheContext::new(Arc::new(MemoryBackend::new()), CacheConfig::default());
/// let expensive = ctx.memoize(
///     "demo.add",
///     MemoConfig::new(Duration::from_secs(60)),
///     |&(a, b): &(i32, i32)| a + b,
/// );
///
/// assert_eq!(expensive.call(&(1, 2)).unwrap(), 3);
/// assert_eq!(
///     expensive.get_cache_key(&(1, 2)).unwrap(),
///     "[cached]demo.add((1, 2))"
/// );
/// expensive.invalidate(&(1, 2)).unwrap();
/// ```
pub struct Memoizer<A, R, F> {
    identity: String,
    config: MemoConfig,
    store: GroupStore,
    registry: Arc<InvalidationRegistry>,
    func: F,
    _types: PhantomData<fn(&A) -> R>,
}

impl<A, R, F> Memoizer<A, R, F>
where
    A: ToArgs,
    R: Serialize + DeserializeOwned,
    F: Fn(&A) -> R,
{
    /// Binds `func` under `identity`.
    ///
    /// `identity` names the computation for the lifetime of the process and
    /// must be stable across restarts (it is part of every key); qualified
    /// name plus a disambiguator is the usual shape, e.g.
    /// `"billing.reports.monthly_totals"`.
    pub fn new(
        identity: impl Into<String>,
        config: MemoConfig,
        store: GroupStore,
        registry: Arc<InvalidationRegistry>,
        func: F,
    ) -> Self {
        Self {
            identity: identity.into(),
            config,
            store,
            registry,
            func,
            _types: PhantomData,
        }
    }

    fn group(&self) -> Option<&str> {
        self.config.group.as_deref()
    }

    /// Returns the literal derived key for `args`, for diagnostics and for
    /// external bulk-deletion tooling.
    pub fn get_cache_key(&self, args: &A) -> Result<String, CacheError> {
        let parts = args.to_args();
        let identity = self.config.key_override.as_deref().unwrap_or(&self.identity);
        let raw = if self.config.hashed_keys {
            hashed_key(identity, self.config.call_kind, &parts)?
        } else {
            derive_key(identity, self.config.call_kind, &parts)?
        };
        Ok(sanitize_key(&raw, MAX_KEY_LENGTH))
    }

    /// Serves the cached result for `args`, computing and storing it on
    /// miss.
    ///
    /// The bound computation runs at most once per `call`, even on miss. On
    /// miss the produced key is also registered under every configured
    /// entity kind.
    pub fn call(&self, args: &A) -> Result<R, CacheError> {
        let key = self.get_cache_key(args)?;
        if let Some(value) = self.store.get::<R>(&key, self.group())? {
            return Ok(value);
        }

        let value = (self.func)(args);
        self.store
            .set(&key, &value, self.config.ttl, self.group())?;
        self.register(&key)?;
        Ok(value)
    }

    /// Drops the cached result for `args`. Never fails on an absent key.
    pub fn invalidate(&self, args: &A) -> Result<(), CacheError> {
        let key = self.get_cache_key(args)?;
        self.store.delete(&key, self.group())
    }

    /// Unconditionally recomputes, stores and returns the result for `args`,
    /// bypassing any cached value.
    pub fn force_recalc(&self, args: &A) -> Result<R, CacheError> {
        let key = self.get_cache_key(args)?;
        let value = (self.func)(args);
        self.store
            .set(&key, &value, self.config.ttl, self.group())?;
        self.register(&key)?;
        Ok(value)
    }

    /// Serves the cached result for `args` or fails with
    /// [`CacheError::NotFound`]; never invokes the computation.
    pub fn require_cache(&self, args: &A) -> Result<R, CacheError> {
        let key = self.get_cache_key(args)?;
        self.store
            .get::<R>(&key, self.group())?
            .ok_or(CacheError::NotFound(key))
    }

    fn register(&self, key: &str) -> Result<(), CacheError> {
        if self.config.entity_kinds.is_empty() {
            return Ok(());
        }
        self.registry
            .register(&self.config.entity_kinds, key, self.group())
    }
}
