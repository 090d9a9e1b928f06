use crate::context::Context;
use crate::error::RemoteError;
use crate::remote::{AsyncRemoteStore, RemoteStore};

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use futures_util::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;

struct StoredEntry {
  data: Vec<u8>,
  /// `None` when the TTL reaches past what an `Instant` can represent.
  expires_at: Option<Instant>,
}

impl StoredEntry {
  fn is_live(&self, now: Instant) -> bool {
    match self.expires_at {
      Some(expires_at) => now < expires_at,
      None => true,
    }
  }
}

/// An in-process store with per-entry TTLs.
///
/// Expired entries are dropped lazily, on the next access to their key. Useful
/// for tests and for running a service without a networked cache.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, StoredEntry>>,
}

impl fmt::Debug for MemoryStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryStore")
      .field("entries", &self.entries.lock().len())
      .finish()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of entries currently held, including expired ones not yet
  /// dropped.
  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn set_entry(&self, key: &str, value: &[u8], ttl: Duration) {
    let entry = StoredEntry {
      data: value.to_vec(),
      expires_at: Instant::now().checked_add(ttl),
    };
    self.entries.lock().insert(key.to_string(), entry);
  }

  fn get_entry(&self, key: &str) -> Result<Vec<u8>, RemoteError> {
    let mut entries = self.entries.lock();
    match entries.get(key) {
      Some(entry) if entry.is_live(Instant::now()) => Ok(entry.data.clone()),
      Some(_) => {
        entries.remove(key);
        Err(RemoteError::Nil)
      }
      None => Err(RemoteError::Nil),
    }
  }

  fn del_entry(&self, key: &str) {
    self.entries.lock().remove(key);
  }
}

impl RemoteStore for MemoryStore {
  fn set(&self, _ctx: &Context, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError> {
    self.set_entry(key, value, ttl);
    Ok(())
  }

  fn get(&self, _ctx: &Context, key: &str) -> Result<Vec<u8>, RemoteError> {
    self.get_entry(key)
  }

  fn del(&self, _ctx: &Context, key: &str) -> Result<(), RemoteError> {
    self.del_entry(key);
    Ok(())
  }
}

impl AsyncRemoteStore for MemoryStore {
  fn set<'a>(
    &'a self,
    key: &'a str,
    value: &'a [u8],
    ttl: Duration,
  ) -> BoxFuture<'a, Result<(), RemoteError>> {
    self.set_entry(key, value, ttl);
    future::ready(Ok(())).boxed()
  }

  fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RemoteError>> {
    future::ready(self.get_entry(key)).boxed()
  }

  fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), RemoteError>> {
    self.del_entry(key);
    future::ready(Ok(())).boxed()
  }
}
