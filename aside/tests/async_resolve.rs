use fibre_aside::{AsideBuilder, AsyncRemoteStore, Context, Error, MemoryStore};
use std::io;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tokio::sync::Barrier;
use tokio::time::{sleep, Duration};

#[tokio::test]
async fn test_async_resolve_populates_then_hits() {
  let store = Arc::new(MemoryStore::new());
  let aside = AsideBuilder::new()
    .remote(store.clone())
    .build_async()
    .unwrap();
  let ctx = Context::background();
  let load_count = AtomicUsize::new(0);
  let count = &load_count;

  // 1. Miss: the producer runs and its value is stored.
  let value = aside
    .resolve(&ctx, "async:key", move |_ctx| async move {
      count.fetch_add(1, Ordering::SeqCst);
      Ok::<_, Error>(Some("test value".to_string()))
    })
    .await
    .unwrap();
  assert_eq!(*value, "test value");
  assert_eq!(
    AsyncRemoteStore::get(&*store, "async:key").await.unwrap(),
    br#""test value""#
  );

  // 2. Hit: no producer call.
  let value = aside
    .resolve(&ctx, "async:key", move |_ctx| async move {
      count.fetch_add(1, Ordering::SeqCst);
      Ok::<_, Error>(Some("other value".to_string()))
    })
    .await
    .unwrap();
  assert_eq!(*value, "test value");
  assert_eq!(
    load_count.load(Ordering::SeqCst),
    1,
    "Producer should not be called again"
  );
  assert_eq!(aside.metrics().hits, 1);
  assert_eq!(aside.metrics().misses, 1);
}

#[tokio::test]
async fn test_async_resolve_reloads_after_remote_ttl() {
  let aside = AsideBuilder::new()
    .remote(MemoryStore::new())
    .remote_ttl(Duration::from_millis(50))
    .build_async()
    .unwrap();
  let ctx = Context::background();
  let load_count = AtomicUsize::new(0);
  let count = &load_count;
  let produce = move |_ctx: Context| async move {
    Ok::<_, Error>(Some(count.fetch_add(1, Ordering::SeqCst) + 1))
  };

  assert_eq!(*aside.resolve(&ctx, "async:ttl", produce).await.unwrap(), 1);
  assert_eq!(*aside.resolve(&ctx, "async:ttl", produce).await.unwrap(), 1);

  sleep(Duration::from_millis(100)).await;

  assert_eq!(*aside.resolve(&ctx, "async:ttl", produce).await.unwrap(), 2);
}

#[tokio::test]
async fn test_async_resolve_thundering_herd() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let num_tasks = 20;

  let aside = AsideBuilder::new()
    .remote(MemoryStore::new())
    .build_async()
    .unwrap();
  let barrier = Arc::new(Barrier::new(num_tasks));
  let mut tasks = vec![];

  for _ in 0..num_tasks {
    let aside = aside.clone();
    let barrier = barrier.clone();
    let load_count = load_count.clone();
    tasks.push(tokio::spawn(async move {
      // Wait for all tasks to be ready
      barrier.wait().await;
      // All tasks request the same missing key at once
      aside
        .resolve(&Context::background(), "async:herd", |_ctx| async move {
          // Simulate a slow database call
          sleep(Duration::from_millis(100)).await;
          load_count.fetch_add(1, Ordering::SeqCst);
          Ok::<_, Error>(Some(990u64))
        })
        .await
        .unwrap()
    }));
  }

  for task in tasks {
    assert_eq!(*task.await.unwrap(), 990);
  }

  assert_eq!(
    load_count.load(Ordering::SeqCst),
    1,
    "Producer should only be called once for a thundering herd"
  );
  assert_eq!(aside.metrics().loads, 1);
  assert!(!fibre_aside::in_flight("async:herd"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_herd_shares_producer_error() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let num_tasks = 10;

  let aside = AsideBuilder::new()
    .remote(MemoryStore::new())
    .build_async()
    .unwrap();
  let barrier = Arc::new(Barrier::new(num_tasks));
  let mut tasks = vec![];

  for _ in 0..num_tasks {
    let aside = aside.clone();
    let barrier = barrier.clone();
    let load_count = load_count.clone();
    tasks.push(tokio::spawn(async move {
      barrier.wait().await;
      aside
        .resolve(&Context::background(), "async:herd_err", |_ctx| async move {
          sleep(Duration::from_millis(100)).await;
          load_count.fetch_add(1, Ordering::SeqCst);
          Err::<Option<u64>, _>(io::Error::new(io::ErrorKind::Other, "db down"))
        })
        .await
    }));
  }

  for task in tasks {
    match task.await.unwrap() {
      Err(Error::Producer(err)) => assert_eq!(err.to_string(), "db down"),
      other => panic!("unexpected outcome: {other:?}"),
    }
  }
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_async_producer_error_is_not_cached() {
  let store = Arc::new(MemoryStore::new());
  let aside = AsideBuilder::new()
    .remote(store.clone())
    .build_async()
    .unwrap();
  let ctx = Context::background();

  let err = aside
    .resolve(&ctx, "async:producer_err", |_ctx| async {
      Err::<Option<String>, _>(io::Error::new(io::ErrorKind::Other, "db down"))
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Producer(_)));
  assert!(store.is_empty());
  assert_eq!(aside.metrics().load_failures, 1);
}
