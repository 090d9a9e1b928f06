#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fibre_aside::{AsyncRemoteStore, Context, MemoryStore, RemoteError, RemoteStore};
use futures_util::future::{self, BoxFuture, FutureExt};

#[derive(Debug, thiserror::Error)]
#[error("connection refused")]
pub struct ConnectionRefused;

#[derive(Debug, thiserror::Error)]
#[error("key has no value")]
pub struct KeyMissing;

// A store whose every call fails with a backend error.
pub struct FailingStore;

impl RemoteStore for FailingStore {
  fn set(&self, _: &Context, _: &str, _: &[u8], _: Duration) -> Result<(), RemoteError> {
    Err(RemoteError::backend(ConnectionRefused))
  }
  fn get(&self, _: &Context, _: &str) -> Result<Vec<u8>, RemoteError> {
    Err(RemoteError::backend(ConnectionRefused))
  }
  fn del(&self, _: &Context, _: &str) -> Result<(), RemoteError> {
    Err(RemoteError::backend(ConnectionRefused))
  }
}

impl AsyncRemoteStore for FailingStore {
  fn set<'a>(&'a self, _: &'a str, _: &'a [u8], _: Duration) -> BoxFuture<'a, Result<(), RemoteError>> {
    future::ready(Err(RemoteError::backend(ConnectionRefused))).boxed()
  }
  fn get<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RemoteError>> {
    future::ready(Err(RemoteError::backend(ConnectionRefused))).boxed()
  }
  fn del<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<(), RemoteError>> {
    future::ready(Err(RemoteError::backend(ConnectionRefused))).boxed()
  }
}

// Reads always miss, writes always fail.
pub struct UnwritableStore;

impl RemoteStore for UnwritableStore {
  fn set(&self, _: &Context, _: &str, _: &[u8], _: Duration) -> Result<(), RemoteError> {
    Err(RemoteError::backend(ConnectionRefused))
  }
  fn get(&self, _: &Context, _: &str) -> Result<Vec<u8>, RemoteError> {
    Err(RemoteError::Nil)
  }
  fn del(&self, _: &Context, _: &str) -> Result<(), RemoteError> {
    Ok(())
  }
}

impl AsyncRemoteStore for UnwritableStore {
  fn set<'a>(&'a self, _: &'a str, _: &'a [u8], _: Duration) -> BoxFuture<'a, Result<(), RemoteError>> {
    future::ready(Err(RemoteError::backend(ConnectionRefused))).boxed()
  }
  fn get<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RemoteError>> {
    future::ready(Err(RemoteError::Nil)).boxed()
  }
  fn del<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<(), RemoteError>> {
    future::ready(Ok(())).boxed()
  }
}

// A backend that reports absence with its own error type instead of `Nil`,
// and counts how often it is read.
#[derive(Default)]
pub struct ForeignNilStore {
  pub inner: MemoryStore,
  pub gets: AtomicUsize,
}

impl RemoteStore for ForeignNilStore {
  fn set(&self, ctx: &Context, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError> {
    RemoteStore::set(&self.inner, ctx, key, value, ttl)
  }

  fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>, RemoteError> {
    self.gets.fetch_add(1, Ordering::SeqCst);
    RemoteStore::get(&self.inner, ctx, key).map_err(|err| {
      if err.is_nil() {
        RemoteError::backend(KeyMissing)
      } else {
        err
      }
    })
  }

  fn del(&self, ctx: &Context, key: &str) -> Result<(), RemoteError> {
    RemoteStore::del(&self.inner, ctx, key)
  }

  fn is_nil(&self, err: &RemoteError) -> bool {
    match err {
      RemoteError::Nil => true,
      RemoteError::Backend(inner) => inner.downcast_ref::<KeyMissing>().is_some(),
    }
  }
}

// Reads return bytes no codec accepts, deletes fail.
#[derive(Default)]
pub struct UndeletableCorruptStore {
  pub dels: AtomicUsize,
}

impl UndeletableCorruptStore {
  pub const GARBAGE: &'static [u8] = b"\x00garbage{";
}

impl RemoteStore for UndeletableCorruptStore {
  fn set(&self, _: &Context, _: &str, _: &[u8], _: Duration) -> Result<(), RemoteError> {
    Ok(())
  }
  fn get(&self, _: &Context, _: &str) -> Result<Vec<u8>, RemoteError> {
    Ok(Self::GARBAGE.to_vec())
  }
  fn del(&self, _: &Context, _: &str) -> Result<(), RemoteError> {
    self.dels.fetch_add(1, Ordering::SeqCst);
    Err(RemoteError::backend(ConnectionRefused))
  }
}

impl AsyncRemoteStore for UndeletableCorruptStore {
  fn set<'a>(&'a self, _: &'a str, _: &'a [u8], _: Duration) -> BoxFuture<'a, Result<(), RemoteError>> {
    future::ready(Ok(())).boxed()
  }
  fn get<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RemoteError>> {
    future::ready(Ok(Self::GARBAGE.to_vec())).boxed()
  }
  fn del<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<(), RemoteError>> {
    self.dels.fetch_add(1, Ordering::SeqCst);
    future::ready(Err(RemoteError::backend(ConnectionRefused))).boxed()
  }
}
