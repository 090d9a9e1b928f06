//! Redis adapters.
//!
//! `GET` replies with nil for missing or expired keys, which maps onto
//! [`RemoteError::Nil`]. Entries are written with `SET key value PX ttl`.

use crate::context::Context;
use crate::error::RemoteError;
use crate::remote::{AsyncRemoteStore, RemoteStore};

use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{Client, Cmd, Connection};

/// Redis adds the current time to `PX` and rejects sums past `i64::MAX`.
const MAX_TTL_MILLIS: u64 = (i64::MAX / 2) as u64;

/// Redis rejects `PX 0`, so sub-millisecond TTLs are rounded up. Oversized
/// TTLs saturate.
fn ttl_millis(ttl: Duration) -> u64 {
  u64::try_from(ttl.as_millis())
    .unwrap_or(u64::MAX)
    .clamp(1, MAX_TTL_MILLIS)
}

fn set_cmd(key: &str, value: &[u8], ttl: Duration) -> Cmd {
  let mut cmd = redis::cmd("SET");
  cmd.arg(key).arg(value).arg("PX").arg(ttl_millis(ttl));
  cmd
}

fn get_cmd(key: &str) -> Cmd {
  let mut cmd = redis::cmd("GET");
  cmd.arg(key);
  cmd
}

fn del_cmd(key: &str) -> Cmd {
  let mut cmd = redis::cmd("DEL");
  cmd.arg(key);
  cmd
}

fn nil_if_absent(value: Option<Vec<u8>>) -> Result<Vec<u8>, RemoteError> {
  value.ok_or(RemoteError::Nil)
}

/// Async Redis store over a multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
  conn: MultiplexedConnection,
}

impl RedisStore {
  /// Opens a multiplexed connection using `client`.
  pub async fn connect(client: &Client) -> Result<Self, RemoteError> {
    let conn = client
      .get_multiplexed_async_connection()
      .await
      .map_err(RemoteError::backend)?;
    tracing::debug!("redis store connected");
    Ok(Self { conn })
  }

  pub fn from_connection(conn: MultiplexedConnection) -> Self {
    Self { conn }
  }
}

impl AsyncRemoteStore for RedisStore {
  fn set<'a>(
    &'a self,
    key: &'a str,
    value: &'a [u8],
    ttl: Duration,
  ) -> BoxFuture<'a, Result<(), RemoteError>> {
    let mut conn = self.conn.clone();
    async move {
      set_cmd(key, value, ttl)
        .query_async::<()>(&mut conn)
        .await
        .map_err(RemoteError::backend)
    }
    .boxed()
  }

  fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RemoteError>> {
    let mut conn = self.conn.clone();
    async move {
      let value = get_cmd(key)
        .query_async::<Option<Vec<u8>>>(&mut conn)
        .await
        .map_err(RemoteError::backend)?;
      nil_if_absent(value)
    }
    .boxed()
  }

  fn del<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), RemoteError>> {
    let mut conn = self.conn.clone();
    async move {
      del_cmd(key)
        .query_async::<()>(&mut conn)
        .await
        .map_err(RemoteError::backend)
    }
    .boxed()
  }
}

/// Blocking Redis store over a single connection.
///
/// The connection's read and write timeouts are bounded by the caller's
/// deadline for the duration of each command.
pub struct BlockingRedisStore {
  conn: Mutex<Connection>,
}

impl BlockingRedisStore {
  pub fn connect(client: &Client) -> Result<Self, RemoteError> {
    let conn = client.get_connection().map_err(RemoteError::backend)?;
    Ok(Self::from_connection(conn))
  }

  pub fn from_connection(conn: Connection) -> Self {
    Self {
      conn: Mutex::new(conn),
    }
  }

  fn query<T: redis::FromRedisValue>(&self, ctx: &Context, cmd: &Cmd) -> Result<T, RemoteError> {
    let mut conn = self.conn.lock();
    // A zero timeout means "none" to the socket layer, keep at least 1ms.
    let timeout = ctx.remaining().map(|d| d.max(Duration::from_millis(1)));
    conn.set_read_timeout(timeout).map_err(RemoteError::backend)?;
    conn.set_write_timeout(timeout).map_err(RemoteError::backend)?;
    cmd.query::<T>(&mut *conn).map_err(RemoteError::backend)
  }
}

impl RemoteStore for BlockingRedisStore {
  fn set(&self, ctx: &Context, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError> {
    self.query::<()>(ctx, &set_cmd(key, value, ttl))
  }

  fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>, RemoteError> {
    let value = self.query::<Option<Vec<u8>>>(ctx, &get_cmd(key))?;
    nil_if_absent(value)
  }

  fn del(&self, ctx: &Context, key: &str) -> Result<(), RemoteError> {
    self.query::<()>(ctx, &del_cmd(key))
  }
}
