//! Contracts for the remote key-value store entries are cached in.
//!
//! The orchestrator needs four things from a backend: upsert with a TTL, get,
//! delete, and a way to tell "key absent" apart from every other failure.
//! Absence is reported as [`RemoteError::Nil`]; adapters whose backends signal
//! it differently can override `is_nil`.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::{BlockingRedisStore, RedisStore};

use crate::context::Context;
use crate::error::RemoteError;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

/// A blocking remote store.
///
/// Calls receive the caller's [`Context`] so adapters can bound network I/O by
/// its deadline or give up once it is cancelled.
pub trait RemoteStore: Send + Sync + 'static {
  /// Upserts `value` under `key`; the entry disappears after `ttl`.
  fn set(&self, ctx: &Context, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError>;

  /// Returns the stored bytes, or [`RemoteError::Nil`] when there is no live
  /// entry.
  fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>, RemoteError>;

  /// Removes the entry. Deleting an absent key is not an error.
  fn del(&self, ctx: &Context, key: &str) -> Result<(), RemoteError>;

  /// Whether `err` means "key absent" for this backend.
  fn is_nil(&self, err: &RemoteError) -> bool {
    err.is_nil()
  }
}

/// An asynchronous remote store.
///
/// Cancellation is by drop: the orchestrator races each returned future
/// against the caller's [`Context`] and drops it once the context is done.
pub trait AsyncRemoteStore: Send + Sync + 'static {
  fn set<'a>(
    &'a self,
    key: &'a str,
    value: &'a [u8],
    ttl: Duration,
  ) -> BoxFuture<'a, Result<(), RemoteError>>;

  fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RemoteError>>;

  fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), RemoteError>>;

  fn is_nil(&self, err: &RemoteError) -> bool {
    err.is_nil()
  }
}

impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
  fn set(&self, ctx: &Context, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError> {
    (**self).set(ctx, key, value, ttl)
  }

  fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>, RemoteError> {
    (**self).get(ctx, key)
  }

  fn del(&self, ctx: &Context, key: &str) -> Result<(), RemoteError> {
    (**self).del(ctx, key)
  }

  fn is_nil(&self, err: &RemoteError) -> bool {
    (**self).is_nil(err)
  }
}

impl<S: AsyncRemoteStore + ?Sized> AsyncRemoteStore for Arc<S> {
  fn set<'a>(
    &'a self,
    key: &'a str,
    value: &'a [u8],
    ttl: Duration,
  ) -> BoxFuture<'a, Result<(), RemoteError>> {
    (**self).set(key, value, ttl)
  }

  fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RemoteError>> {
    (**self).get(key)
  }

  fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), RemoteError>> {
    (**self).del(key)
  }

  fn is_nil(&self, err: &RemoteError) -> bool {
    (**self).is_nil(err)
  }
}
