use fibre_aside::{AsideBuilder, Context, Error, MemoryStore, RemoteStore};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc, Barrier,
};
use std::thread;
use std::time::Duration;

#[test]
fn test_sync_resolve_populates_then_hits() {
  let store = Arc::new(MemoryStore::new());
  let aside = AsideBuilder::new().remote(store.clone()).build().unwrap();
  let ctx = Context::background();
  let load_count = AtomicUsize::new(0);

  // 1. Miss: the producer runs and its value is stored.
  let value = aside
    .resolve(&ctx, "sync:key", |_ctx| {
      load_count.fetch_add(1, Ordering::SeqCst);
      Ok::<_, Error>(Some("test value".to_string()))
    })
    .unwrap();
  assert_eq!(*value, "test value");
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
  assert_eq!(
    RemoteStore::get(&*store, &ctx, "sync:key").unwrap(),
    br#""test value""#
  );

  // 2. Hit: the stored value is returned and the producer is not called.
  let value = aside
    .resolve(&ctx, "sync:key", |_ctx| {
      load_count.fetch_add(1, Ordering::SeqCst);
      Ok::<_, Error>(Some("other value".to_string()))
    })
    .unwrap();
  assert_eq!(*value, "test value");
  assert_eq!(
    load_count.load(Ordering::SeqCst),
    1,
    "Producer should NOT be called again"
  );

  let metrics = aside.metrics();
  assert_eq!(metrics.misses, 1);
  assert_eq!(metrics.hits, 1);
  assert_eq!(metrics.loads, 1);
  assert_eq!(metrics.stored, 1);
}

#[test]
fn test_sync_resolve_reloads_after_remote_ttl() {
  let aside = AsideBuilder::new()
    .remote(MemoryStore::new())
    .remote_ttl(Duration::from_millis(50))
    .build()
    .unwrap();
  let ctx = Context::background();
  let load_count = AtomicUsize::new(0);
  let produce = |_ctx: Context| {
    let n = load_count.fetch_add(1, Ordering::SeqCst) + 1;
    Ok::<_, Error>(Some(n))
  };

  assert_eq!(*aside.resolve(&ctx, "sync:ttl", produce).unwrap(), 1);
  assert_eq!(*aside.resolve(&ctx, "sync:ttl", produce).unwrap(), 1);

  thread::sleep(Duration::from_millis(100));

  assert_eq!(*aside.resolve(&ctx, "sync:ttl", produce).unwrap(), 2);
  assert_eq!(load_count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_sync_resolve_thundering_herd() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let num_threads = 20;

  let aside = AsideBuilder::new().remote(MemoryStore::new()).build().unwrap();
  let barrier = Arc::new(Barrier::new(num_threads));
  let mut handles = vec![];

  for _ in 0..num_threads {
    let aside = aside.clone();
    let barrier = barrier.clone();
    let load_count = load_count.clone();
    handles.push(thread::spawn(move || {
      // Wait for all threads to be ready
      barrier.wait();
      // All threads request the same missing key at once
      aside
        .resolve(&Context::background(), "sync:herd", |_ctx| {
          // Simulate a slow database call
          thread::sleep(Duration::from_millis(100));
          load_count.fetch_add(1, Ordering::SeqCst);
          Ok::<_, Error>(Some(990u64))
        })
        .unwrap()
    }));
  }

  for handle in handles {
    assert_eq!(*handle.join().unwrap(), 990);
  }

  assert_eq!(
    load_count.load(Ordering::SeqCst),
    1,
    "Producer should only be called once for a thundering herd"
  );
  assert!(!fibre_aside::in_flight("sync:herd"));
}

#[test]
fn test_sync_herd_shares_producer_error() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let num_threads = 8;

  let aside = AsideBuilder::new().remote(MemoryStore::new()).build().unwrap();
  let barrier = Arc::new(Barrier::new(num_threads));
  let mut handles = vec![];

  for _ in 0..num_threads {
    let aside = aside.clone();
    let barrier = barrier.clone();
    let load_count = load_count.clone();
    handles.push(thread::spawn(move || {
      barrier.wait();
      aside.resolve(&Context::background(), "sync:herd_err", |_ctx| {
        thread::sleep(Duration::from_millis(100));
        load_count.fetch_add(1, Ordering::SeqCst);
        Err::<Option<u64>, _>(io::Error::new(io::ErrorKind::Other, "db down"))
      })
    }));
  }

  for handle in handles {
    match handle.join().unwrap() {
      Err(Error::Producer(err)) => assert_eq!(err.to_string(), "db down"),
      other => panic!("unexpected outcome: {other:?}"),
    }
  }
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sync_producer_error_is_not_cached() {
  let store = Arc::new(MemoryStore::new());
  let aside = AsideBuilder::new().remote(store.clone()).build().unwrap();
  let ctx = Context::background();
  let load_count = AtomicUsize::new(0);
  let failing = |_ctx: Context| {
    load_count.fetch_add(1, Ordering::SeqCst);
    Err::<Option<String>, _>(io::Error::new(io::ErrorKind::Other, "db down"))
  };

  let err = aside.resolve(&ctx, "sync:producer_err", failing).unwrap_err();
  assert!(matches!(err, Error::Producer(_)));
  assert!(store.is_empty(), "a failed load must not be persisted");

  // No retry within a call, but the next call tries again.
  aside.resolve(&ctx, "sync:producer_err", failing).unwrap_err();
  assert_eq!(load_count.load(Ordering::SeqCst), 2);
  assert_eq!(aside.metrics().load_failures, 2);
}

#[test]
fn test_sync_resolve_structured_values() {
  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct User {
    id: u64,
    name: String,
    roles: Vec<String>,
  }

  let aside = AsideBuilder::new().remote(MemoryStore::new()).build().unwrap();
  let ctx = Context::background();
  let expected = User {
    id: 42,
    name: "ada".to_string(),
    roles: vec!["admin".to_string()],
  };

  let loaded = aside
    .resolve(&ctx, "sync:user:42", |_ctx| Ok::<_, Error>(Some(expected.clone())))
    .unwrap();
  assert_eq!(*loaded, expected);

  // The second call decodes the stored JSON.
  let cached = aside
    .resolve(&ctx, "sync:user:42", |_ctx| -> Result<Option<User>, Error> {
      panic!("producer must not run on a hit")
    })
    .unwrap();
  assert_eq!(*cached, expected);
}

#[test]
fn test_unbounded_ttls_and_timeouts() {
  let aside = AsideBuilder::new()
    .remote(MemoryStore::new())
    .remote_ttl(Duration::MAX)
    .not_found_ttl(Duration::MAX)
    .build()
    .unwrap();
  let ctx = Context::with_timeout(Duration::MAX);
  assert!(ctx.deadline().is_none());

  let value = aside
    .resolve(&ctx, "sync:forever", |_ctx| Ok::<_, Error>(Some(1u8)))
    .unwrap();
  assert_eq!(*value, 1);
  let value = aside
    .resolve(&ctx, "sync:forever", |_ctx| Ok::<_, Error>(Some(2u8)))
    .unwrap();
  assert_eq!(*value, 1);

  let err = aside
    .resolve(&ctx, "sync:forever_absent", |_ctx| Ok::<Option<u8>, Error>(None))
    .unwrap_err();
  assert!(err.is_not_found());
  assert_eq!(aside.metrics().negative_stored, 1);
}
