//! # mintcache
//!
//! Memoization and invalidation layer in front of a shared key-value cache
//! backend.
//!
//! Given a computation with a stable identity and a set of arguments, the
//! layer derives a deterministic, backend-safe cache key, serves cached
//! results while they are fresh, recomputes on miss and protects the backend
//! from a thundering-herd recomputation storm (the "dog-pile effect") when a
//! hot entry expires.
//!
//! ## Features
//!
//! - **Readable cache keys**: keys are built from the computation's identity
//!   and canonicalized arguments, then sanitized for the backend's key-length
//!   limit
//! - **Dog-pile prevention**: the mint-cache scheme lets exactly one caller
//!   recompute an expired entry while everyone else rides on the stale value
//! - **Exact invalidation**: drop the entry for one argument set
//! - **Group invalidation**: bulk-invalidate every key in a named group in
//!   O(1) by rotating an indirection token
//! - **Entity invalidation**: tag bindings with entity kinds and bulk-drop
//!   every tagged entry when an instance of that kind mutates
//! - **Pluggable backend**: any get/set/add/delete byte store implementing
//!   [`CacheBackend`]; [`MemoryBackend`] ships for tests and embedding
//!
//! ## Module Organization
//!
//! - [`keys`] - argument canonicalization and key derivation/sanitization
//! - `entry` - the mint-cache wire format ([`CacheEntry`])
//! - `backend` - the backend contract and the in-process implementation
//! - `group_store` - the dog-pile-preventing store ([`GroupStore`])
//! - `registry` - entity-kind tracking ([`InvalidationRegistry`])
//! - `memoizer` - the per-binding façade ([`Memoizer`])
//! - `context` - the root-scope wiring object ([`CacheContext`])
//!
//! ## Quickstart
//!
//! ```
//! use mintcache::{CacheConfig, CacheContext, MemoConfig, MemoryBackend};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let ctx = CacheContext::new(Arc::new(MemoryBackend::new()), CacheConfig::default());
//!
//! let totals = ctx.memoize(
//!     "billing.monthly_totals",
//!     MemoConfig::new(Duration::from_secs(300))
//!         .group("billing")
//!         .entity_kinds(["Invoice"]),
//!     |&(year, month): &(i32, u32)| {
//!         // expensive aggregation stands here
//!         i64::from(year) * 100 + i64::from(month)
//!     },
//! );
//!
//! // first call computes, second is served from the cache
//! assert_eq!(totals.call(&(2024, 5)).unwrap(), 202_405);
//! assert_eq!(totals.call(&(2024, 5)).unwrap(), 202_405);
//!
//! // exact-argument invalidation
//! totals.invalidate(&(2024, 5)).unwrap();
//!
//! // bulk invalidation, wired to the host's post-save hook
//! ctx.invalidate_entity("Invoice").unwrap();
//!
//! // group invalidation, O(1) regardless of entry count
//! ctx.invalidate_group("billing").unwrap();
//! ```
//!
//! ## What this layer does not do
//!
//! There is no distributed lock (two callers can still race into one
//! redundant recomputation), no cross-replica consistency guarantee beyond
//! what the backend gives, and no automatic dependency discovery — entity
//! kinds are declared explicitly per binding.

mod backend;
mod context;
mod entry;
mod error;
mod group_store;
mod memoizer;
mod registry;

pub mod keys;

pub use backend::{CacheBackend, MemoryBackend};
pub use context::{CacheConfig, CacheContext};
pub use entry::CacheEntry;
pub use error::CacheError;
pub use group_store::{GroupStore, MINT_DELAY};
pub use keys::{
    derive_key, hashed_key, sanitize_key, Arg, CallArgs, CallKind, ToArg, ToArgs, MAX_KEY_LENGTH,
};
pub use memoizer::{MemoConfig, Memoizer};
pub use registry::{InvalidationRegistry, TrackedKey};
