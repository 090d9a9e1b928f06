use crate::codec::Codec;
use crate::context::Context;
use crate::dedup::{self, Join, Outcome};
use crate::error::{Error, RemoteError, Result};
use crate::flight::FlightWait;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::remote::{AsyncRemoteStore, RemoteStore};
use crate::shared::{AsideShared, Fetched, Produced};
use crate::Aside;

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// An asynchronous cache-aside handle.
///
/// Every remote call, the producer and any wait on an in-flight load are raced
/// against the caller's [`Context`]. Dropping the returned future is also a
/// valid way to give up; a dropped leader hands [`Error::Abandoned`] to its
/// waiters.
pub struct AsyncAside<R, C> {
  pub(crate) shared: Arc<AsideShared<R, C>>,
}

impl<R, C> Clone for AsyncAside<R, C> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<R, C> fmt::Debug for AsyncAside<R, C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncAside")
      .field("shared", &self.shared)
      .finish()
  }
}

impl<R, C> AsyncAside<R, C>
where
  R: AsyncRemoteStore,
  C: Codec,
{
  /// Converts this asynchronous `AsyncAside` into a blocking `Aside`.
  /// This is a zero-cost conversion.
  pub fn to_sync(&self) -> Aside<R, C>
  where
    R: RemoteStore,
  {
    Aside {
      shared: self.shared.clone(),
    }
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// Asynchronously returns the value for `key`, loading it with `producer`
  /// on a miss.
  ///
  /// Same protocol as [`Aside::resolve`]. Waiters for an in-flight load may
  /// be blocked threads and async tasks at the same time, whichever handle
  /// kind the leader uses.
  pub async fn resolve<T, E, F, Fut>(&self, ctx: &Context, key: &str, producer: F) -> Result<Arc<T>>
  where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    E: StdError + Send + Sync + 'static,
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = std::result::Result<Option<T>, E>>,
  {
    if let Some(value) = self.lookup::<T>(ctx, key).await? {
      return Ok(Arc::new(value));
    }

    match dedup::join::<T>(key)? {
      Join::Leader(guard) => {
        tracing::debug!(key = %key, "elected leader for load");
        let outcome = self.load(ctx, key, producer).await;
        self.shared.record_outcome(key, &outcome);
        guard.finish(outcome)
      }
      Join::Waiter(flight) => {
        Metrics::incr(&self.shared.metrics.coalesced);
        tracing::debug!(key = %key, "joined in-flight load");
        ctx.run(FlightWait::new(flight)).await?
      }
    }
  }

  async fn lookup<T>(&self, ctx: &Context, key: &str) -> Result<Option<T>>
  where
    T: DeserializeOwned,
  {
    let remote = &self.shared.remote;
    let fetched = ctx.run(AsyncRemoteStore::get(remote, key)).await?;

    match self
      .shared
      .inspect(key, fetched, |err| AsyncRemoteStore::is_nil(remote, err))?
    {
      Fetched::Hit(value) => Ok(Some(value)),
      Fetched::Miss => Ok(None),
      Fetched::Corrupt(err) => {
        let purge = AsyncRemoteStore::del(remote, key);
        if let Err(del_err) = self.remote_call(ctx, purge).await {
          tracing::warn!(key = %key, error = %del_err, "failed to purge undecodable entry");
        }
        Err(err.into())
      }
    }
  }

  async fn load<T, E, F, Fut>(&self, ctx: &Context, key: &str, producer: F) -> Outcome<T>
  where
    T: Serialize + Send + Sync + 'static,
    E: StdError + Send + Sync + 'static,
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = std::result::Result<Option<T>, E>>,
  {
    Metrics::incr(&self.shared.metrics.loads);
    let options = &self.shared.options;
    let remote = &self.shared.remote;

    let produced = ctx.run(producer(ctx.clone())).await?;
    match self.shared.classify(produced) {
      Produced::Value(value) => {
        let data = self.shared.encode(&value)?;
        let write = AsyncRemoteStore::set(remote, key, &data, options.remote_ttl);
        self.remote_call(ctx, write).await?;
        Ok(Arc::new(value))
      }
      Produced::Absent => {
        let write = AsyncRemoteStore::set(remote, key, &options.placeholder, options.not_found_ttl);
        self.remote_call(ctx, write).await?;
        self.shared.record_negative(key);
        Err(options.not_found())
      }
      Produced::Failed(err) => Err(err),
    }
  }

  /// Runs one store operation, giving up once `ctx` is done.
  async fn remote_call<V>(
    &self,
    ctx: &Context,
    op: BoxFuture<'_, std::result::Result<V, RemoteError>>,
  ) -> Result<V> {
    ctx.run(op).await?.map_err(|err| {
      Metrics::incr(&self.shared.metrics.remote_errors);
      Error::Remote(err)
    })
  }
}
