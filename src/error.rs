use thiserror::Error;

/// Errors produced by the memoization layer.
///
/// Backend connectivity and timeout failures are deliberately not retried or
/// translated here: whatever a [`CacheBackend`](crate::CacheBackend)
/// implementation reports is wrapped in [`CacheError::Backend`] and handed to
/// the caller unchanged. The layer adds no resilience logic of its own.
#[derive(Debug, Error)]
pub enum CacheError {
    /// `require_cache` found no entry under the derived key.
    ///
    /// The caller decides the fallback; the memoizer never recomputes on
    /// this path.
    #[error("no cached value under key `{0}`")]
    NotFound(String),

    /// An argument could not be canonicalized into a cache key.
    ///
    /// Raised immediately instead of caching under a degenerate key. Supply a
    /// `key_override` or implement [`ToArg`](crate::ToArg) with an attribute
    /// allow-list for the offending type.
    #[error("argument of type `{type_name}` cannot be canonicalized into a cache key")]
    UnserializableArgument { type_name: String },

    /// The requested store operation is incompatible with the mint-cache
    /// value format and is rejected rather than silently mis-implemented.
    #[error("operation `{0}` is not supported by the mint cache value format")]
    Unsupported(&'static str),

    /// A cache entry or registry payload failed to encode or decode.
    #[error("cache payload serialization failed")]
    Serialization(#[from] serde_json::Error),

    /// The underlying key-value backend reported a failure.
    #[error("cache backend failure")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
    /// Wraps an arbitrary backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CacheError::Backend(Box::new(err))
    }
}
