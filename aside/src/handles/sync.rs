use crate::codec::Codec;
use crate::context::Context;
use crate::dedup::{self, Join, Outcome};
use crate::error::{Error, RemoteError, Result};
use crate::flight::Flight;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::remote::{AsyncRemoteStore, RemoteStore};
use crate::shared::{AsideShared, Fetched, Produced};
use crate::AsyncAside;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A blocking cache-aside handle.
///
/// Handles are cheap to clone. Deduplication does not depend on sharing a
/// handle: every handle in the process coordinates through the same registry.
pub struct Aside<R, C> {
  pub(crate) shared: Arc<AsideShared<R, C>>,
}

impl<R, C> Clone for Aside<R, C> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<R, C> fmt::Debug for Aside<R, C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Aside").field("shared", &self.shared).finish()
  }
}

impl<R, C> Aside<R, C>
where
  R: RemoteStore,
  C: Codec,
{
  /// Converts this blocking `Aside` into an asynchronous `AsyncAside` sharing
  /// the same store, settings and metrics.
  pub fn to_async(&self) -> AsyncAside<R, C>
  where
    R: AsyncRemoteStore,
  {
    AsyncAside {
      shared: self.shared.clone(),
    }
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// Returns the value for `key`, loading it with `producer` on a miss.
  ///
  /// The remote store is consulted first. A stored value is decoded and
  /// returned, a stored not-found placeholder yields [`Error::NotFound`]. On a
  /// miss, exactly one caller per key in the whole process runs `producer`;
  /// every other caller that arrives meanwhile blocks and receives the same
  /// outcome.
  ///
  /// The producer signals absence with `Ok(None)`, [`Error::NotFound`] or any
  /// error the builder was told to treat as not-found. Absence is cached for
  /// the not-found TTL; other producer errors are returned without caching.
  ///
  /// `ctx` bounds the call: waiting stops with [`Error::Cancelled`] or
  /// [`Error::DeadlineExceeded`] once it is done, and the producer receives a
  /// clone of it.
  pub fn resolve<T, E, F>(&self, ctx: &Context, key: &str, producer: F) -> Result<Arc<T>>
  where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    E: StdError + Send + Sync + 'static,
    F: FnOnce(Context) -> std::result::Result<Option<T>, E>,
  {
    if let Some(value) = self.lookup::<T>(ctx, key)? {
      return Ok(Arc::new(value));
    }

    match dedup::join::<T>(key)? {
      Join::Leader(guard) => {
        tracing::debug!(key = %key, "elected leader for load");
        let outcome = self.load(ctx, key, producer);
        self.shared.record_outcome(key, &outcome);
        guard.finish(outcome)
      }
      Join::Waiter(flight) => {
        Metrics::incr(&self.shared.metrics.coalesced);
        tracing::debug!(key = %key, "joined in-flight load");
        wait_blocking(ctx, &flight)
      }
    }
  }

  fn lookup<T>(&self, ctx: &Context, key: &str) -> Result<Option<T>>
  where
    T: DeserializeOwned,
  {
    if let Some(err) = ctx.err() {
      return Err(err);
    }
    let remote = &self.shared.remote;
    let fetched = RemoteStore::get(remote, ctx, key);

    match self.shared.inspect(key, fetched, |err| RemoteStore::is_nil(remote, err))? {
      Fetched::Hit(value) => Ok(Some(value)),
      Fetched::Miss => Ok(None),
      Fetched::Corrupt(err) => {
        if let Err(del_err) = self.remote_call(ctx, |remote| RemoteStore::del(remote, ctx, key)) {
          tracing::warn!(key = %key, error = %del_err, "failed to purge undecodable entry");
        }
        Err(err.into())
      }
    }
  }

  fn load<T, E, F>(&self, ctx: &Context, key: &str, producer: F) -> Outcome<T>
  where
    T: Serialize + Send + Sync + 'static,
    E: StdError + Send + Sync + 'static,
    F: FnOnce(Context) -> std::result::Result<Option<T>, E>,
  {
    Metrics::incr(&self.shared.metrics.loads);
    let options = &self.shared.options;

    match self.shared.classify(producer(ctx.clone())) {
      Produced::Value(value) => {
        let data = self.shared.encode(&value)?;
        self.remote_call(ctx, |remote| {
          RemoteStore::set(remote, ctx, key, &data, options.remote_ttl)
        })?;
        Ok(Arc::new(value))
      }
      Produced::Absent => {
        self.remote_call(ctx, |remote| {
          RemoteStore::set(remote, ctx, key, &options.placeholder, options.not_found_ttl)
        })?;
        self.shared.record_negative(key);
        Err(options.not_found())
      }
      Produced::Failed(err) => Err(err),
    }
  }

  /// Runs one store operation unless `ctx` is already done.
  fn remote_call<V>(
    &self,
    ctx: &Context,
    op: impl FnOnce(&R) -> std::result::Result<V, RemoteError>,
  ) -> Result<V> {
    if let Some(err) = ctx.err() {
      return Err(err);
    }
    op(&self.shared.remote).map_err(|err| {
      Metrics::incr(&self.shared.metrics.remote_errors);
      Error::Remote(err)
    })
  }
}

/// Parks the current thread until `flight` completes or `ctx` is done.
///
/// Giving up early leaves the flight untouched for its leader and the other
/// waiters.
fn wait_blocking<T>(ctx: &Context, flight: &Flight<Outcome<T>>) -> Outcome<T> {
  let outcome = loop {
    if let Some(outcome) = flight.poll_blocking() {
      break outcome;
    }
    if let Some(err) = ctx.err() {
      flight.forget_blocking();
      break Err(err);
    }
    ctx.park_on_cancel();
    // A cancel that landed before registration would never unpark us.
    if ctx.is_cancelled() {
      continue;
    }
    match ctx.remaining() {
      Some(remaining) if remaining > Duration::ZERO => thread::park_timeout(remaining),
      Some(_) => {}
      None => thread::park(),
    }
  };
  ctx.unpark_on_cancel_done();
  outcome
}
