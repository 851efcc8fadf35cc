use mintcache::{
    Arg, CacheConfig, CacheContext, CallArgs, CallKind, MemoConfig, MemoryBackend, ToArgs,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn context() -> CacheContext {
    CacheContext::new(Arc::new(MemoryBackend::new()), CacheConfig::default())
}

#[test]
fn test_group_invalidation() {
    let ctx = context();
    let store = ctx.store();
    let ttl = Duration::from_secs(60);

    store.set("vasia", &"foo", ttl, Some("names")).unwrap();
    store.set("petya", &"bar", ttl, Some("names")).unwrap();
    store.set("red", &"good", ttl, Some("colors")).unwrap();

    let vasia: Option<String> = store.get("vasia", Some("names")).unwrap();
    let petya: Option<String> = store.get("petya", Some("names")).unwrap();
    let red: Option<String> = store.get("red", Some("colors")).unwrap();
    assert_eq!(vasia.as_deref(), Some("foo"));
    assert_eq!(petya.as_deref(), Some("bar"));
    assert_eq!(red.as_deref(), Some("good"));

    ctx.invalidate_group("names").unwrap();

    let vasia: Option<String> = store.get("vasia", Some("names")).unwrap();
    let petya: Option<String> = store.get("petya", Some("names")).unwrap();
    let red: Option<String> = store.get("red", Some("colors")).unwrap();
    assert_eq!(vasia, None);
    assert_eq!(petya, None);
    assert_eq!(red.as_deref(), Some("good"));

    // the group accepts writes again under the fresh token
    store.set("vasia", &"foo", ttl, Some("names")).unwrap();
    let vasia: Option<String> = store.get("vasia", Some("names")).unwrap();
    assert_eq!(vasia.as_deref(), Some("foo"));
}

#[test]
fn test_func_invalidation() {
    let ctx = context();
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_in_func = Arc::clone(&counter);

    let my_func = ctx.memoize(
        "tests.my_func",
        MemoConfig::new(Duration::from_secs(60)),
        move |_: &(i32, i32)| counter_in_func.fetch_add(1, Ordering::SeqCst) + 1,
    );

    assert_eq!(my_func.call(&(1, 2)).unwrap(), 1);
    assert_eq!(my_func.call(&(1, 2)).unwrap(), 1);
    assert_eq!(my_func.call(&(3, 2)).unwrap(), 2);
    assert_eq!(my_func.call(&(3, 2)).unwrap(), 2);

    my_func.invalidate(&(3, 2)).unwrap();

    assert_eq!(my_func.call(&(1, 2)).unwrap(), 1);
    assert_eq!(my_func.call(&(3, 2)).unwrap(), 3);
    assert_eq!(my_func.call(&(3, 2)).unwrap(), 3);
}

struct BarCall {
    receiver_id: u64,
    x: i32,
}

impl ToArgs for BarCall {
    fn to_args(&self) -> CallArgs {
        CallArgs::new()
            .positional(Arg::Object {
                type_name: "Foo".to_string(),
                attrs: vec![("id".to_string(), self.receiver_id.to_string())],
            })
            .positional(self.x)
    }
}

#[test]
fn test_method_invalidation() {
    let ctx = context();
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_in_func = Arc::clone(&counter);

    let bar = ctx.memoize(
        "tests.Foo.bar",
        MemoConfig::new(Duration::from_secs(60)).call_kind(CallKind::Method),
        move |_: &BarCall| counter_in_func.fetch_add(1, Ordering::SeqCst) + 1,
    );

    let call = BarCall {
        receiver_id: 1,
        x: 1,
    };
    assert_eq!(bar.call(&call).unwrap(), 1);
    assert_eq!(bar.call(&call).unwrap(), 1);

    // invalidating through a different receiver hits the same entry:
    // receivers are stripped from key derivation
    let other_receiver = BarCall {
        receiver_id: 99,
        x: 1,
    };
    bar.invalidate(&other_receiver).unwrap();
    assert_eq!(bar.call(&call).unwrap(), 2);
}

#[test]
fn test_invalidate_nonexisting() {
    let ctx = context();
    let foo = ctx.memoize(
        "tests.foo",
        MemoConfig::new(Duration::from_secs(60)),
        |_: &(i32,)| 1,
    );
    // this shouldn't raise
    foo.invalidate(&(5,)).unwrap();
}

#[test]
fn test_entity_invalidation_via_mutation_hook() {
    let ctx = context();
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_in_func = Arc::clone(&counter);

    let user_info = ctx.memoize(
        "tests.user_info",
        MemoConfig::new(Duration::from_secs(60)).entity_kinds(["User"]),
        move |&(id,): &(u64,)| {
            counter_in_func.fetch_add(1, Ordering::SeqCst);
            format!("user-{id}")
        },
    );

    // two distinct keys, both registered under the kind
    user_info.call(&(1,)).unwrap();
    user_info.call(&(2,)).unwrap();
    user_info.call(&(1,)).unwrap();
    user_info.call(&(2,)).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    // the host's post-save hook fires for some User instance
    assert_eq!(ctx.invalidate_entity("User").unwrap(), 2);

    // both entries recompute
    user_info.call(&(1,)).unwrap();
    user_info.call(&(2,)).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[test]
fn test_entity_invalidation_reaches_grouped_entries() {
    let ctx = context();
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_in_func = Arc::clone(&counter);

    let grouped = ctx.memoize(
        "tests.grouped",
        MemoConfig::new(Duration::from_secs(60))
            .group("profiles")
            .entity_kinds(["User"]),
        move |&(id,): &(u64,)| {
            counter_in_func.fetch_add(1, Ordering::SeqCst);
            id
        },
    );

    grouped.call(&(1,)).unwrap();
    grouped.call(&(1,)).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    assert_eq!(ctx.invalidate_entity("User").unwrap(), 1);

    grouped.call(&(1,)).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_entity_invalidation_spans_bindings() {
    let ctx = context();
    let names = Arc::new(AtomicUsize::new(0));
    let emails = Arc::new(AtomicUsize::new(0));
    let names_in_func = Arc::clone(&names);
    let emails_in_func = Arc::clone(&emails);

    let name_of = ctx.memoize(
        "tests.name_of",
        MemoConfig::new(Duration::from_secs(60)).entity_kinds(["User"]),
        move |&(id,): &(u64,)| {
            names_in_func.fetch_add(1, Ordering::SeqCst);
            format!("name-{id}")
        },
    );
    let email_of = ctx.memoize(
        "tests.email_of",
        MemoConfig::new(Duration::from_secs(60)).entity_kinds(["User"]),
        move |&(id,): &(u64,)| {
            emails_in_func.fetch_add(1, Ordering::SeqCst);
            format!("email-{id}")
        },
    );

    name_of.call(&(1,)).unwrap();
    email_of.call(&(1,)).unwrap();

    ctx.invalidate_entity("User").unwrap();

    name_of.call(&(1,)).unwrap();
    email_of.call(&(1,)).unwrap();
    assert_eq!(names.load(Ordering::SeqCst), 2);
    assert_eq!(emails.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unrelated_entity_kind_is_untouched() {
    let ctx = context();
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_in_func = Arc::clone(&counter);

    let order_total = ctx.memoize(
        "tests.order_total",
        MemoConfig::new(Duration::from_secs(60)).entity_kinds(["Order"]),
        move |&(id,): &(u64,)| {
            counter_in_func.fetch_add(1, Ordering::SeqCst);
            id * 100
        },
    );

    order_total.call(&(1,)).unwrap();
    ctx.invalidate_entity("User").unwrap();
    order_total.call(&(1,)).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
