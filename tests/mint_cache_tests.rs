use mintcache::{CacheBackend, CacheConfig, CacheContext, GroupStore, MemoryBackend, MINT_DELAY};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn store() -> GroupStore {
    GroupStore::new(Arc::new(MemoryBackend::new()), "", MINT_DELAY)
}

#[test]
fn test_fresh_entries_are_served_normally() {
    let store = store();
    store
        .set("k", &"fresh", Duration::from_secs(60), None)
        .unwrap();
    for _ in 0..10 {
        let hit: Option<String> = store.get("k", None).unwrap();
        assert_eq!(hit.as_deref(), Some("fresh"));
    }
}

#[test]
fn test_first_stale_observer_pays_the_rest_ride() {
    let store = store();
    // zero logical TTL makes the entry stale immediately while the mint
    // delay keeps it physically alive
    store.set("k", &"old", Duration::ZERO, None).unwrap();

    // exactly the first get reports a miss and flags the entry
    let first: Option<String> = store.get("k", None).unwrap();
    assert_eq!(first, None);

    // every caller within the mint window rides on the stale value
    for _ in 0..10 {
        let stale: Option<String> = store.get("k", None).unwrap();
        assert_eq!(stale.as_deref(), Some("old"));
    }

    // the payer finishes its recomputation
    store
        .set("k", &"new", Duration::from_secs(60), None)
        .unwrap();
    let fresh: Option<String> = store.get("k", None).unwrap();
    assert_eq!(fresh.as_deref(), Some("new"));
}

#[test]
fn test_dog_pile_bound_under_concurrency() {
    let ctx = CacheContext::new(Arc::new(MemoryBackend::new()), CacheConfig::default());
    let computations = Arc::new(AtomicUsize::new(0));
    let computations_in_func = Arc::clone(&computations);

    let memo = ctx.memoize(
        "tests.hot_key",
        mintcache::MemoConfig::new(Duration::from_secs(10)),
        move |&(x,): &(i32,)| {
            computations_in_func.fetch_add(1, Ordering::SeqCst);
            // simulate a slow recomputation
            std::thread::sleep(Duration::from_millis(20));
            x * 2
        },
    );

    // plant an already-stale entry under the key, then hammer it
    let key = memo.get_cache_key(&(21,)).unwrap();
    ctx.store().set(&key, &42, Duration::ZERO, None).unwrap();

    let threads = 16;
    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                let value = memo.call(&(21,)).unwrap();
                assert_eq!(value, 42);
            });
        }
    });

    // the transition is racy by design, so a handful of threads may pay,
    // but never all of them
    let paid = computations.load(Ordering::SeqCst);
    assert!(paid >= 1, "at least one thread must recompute");
    assert!(
        paid < threads,
        "dog-pile bound violated: {paid} of {threads} threads recomputed"
    );
}

#[test]
fn test_flagged_entry_expires_after_mint_delay() {
    let backend = Arc::new(MemoryBackend::new());
    let store = GroupStore::new(
        Arc::clone(&backend) as Arc<dyn CacheBackend>,
        "",
        Duration::from_millis(40),
    );
    store.set("k", &1, Duration::ZERO, None).unwrap();

    let first: Option<i32> = store.get("k", None).unwrap();
    assert_eq!(first, None);
    let stale: Option<i32> = store.get("k", None).unwrap();
    assert_eq!(stale, Some(1));

    // nobody recomputes; once the mint window lapses the entry is gone
    std::thread::sleep(Duration::from_millis(80));
    let gone: Option<i32> = store.get("k", None).unwrap();
    assert_eq!(gone, None);
}

#[test]
fn test_stale_serving_does_not_cross_keys() {
    let store = store();
    store.set("hot", &"stale", Duration::ZERO, None).unwrap();
    store
        .set("cold", &"fresh", Duration::from_secs(60), None)
        .unwrap();

    let miss: Option<String> = store.get("hot", None).unwrap();
    assert_eq!(miss, None);

    // flagging "hot" leaves "cold" in the fresh state
    let cold: Option<String> = store.get("cold", None).unwrap();
    assert_eq!(cold.as_deref(), Some("fresh"));
}
