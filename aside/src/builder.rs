use crate::codec::{Codec, JsonCodec};
use crate::config::AsideConfig;
use crate::error::{BuildError, SharedError};
use crate::handles::{Aside, AsyncAside};
use crate::metrics::Metrics;
use crate::remote::{AsyncRemoteStore, RemoteStore};
use crate::shared::{AsideShared, Options};

use core::fmt;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime of a stored value.
pub const DEFAULT_REMOTE_TTL: Duration = Duration::from_secs(60 * 60);
/// Default lifetime of a not-found placeholder.
pub const DEFAULT_NOT_FOUND_TTL: Duration = Duration::from_secs(60);
/// Default not-found placeholder.
pub const DEFAULT_PLACEHOLDER: &[u8] = b"*";

/// Decides whether a producer error means "the value does not exist".
pub(crate) type NotFoundMatcher = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// A builder for creating `Aside` and `AsyncAside` handles.
///
/// The remote store has no usable default: `build` and `build_async` only
/// become available once [`AsideBuilder::remote`] has been called.
pub struct AsideBuilder<R = (), C = JsonCodec> {
  remote: R,
  codec: C,
  remote_ttl: Duration,
  not_found_ttl: Duration,
  placeholder: Vec<u8>,
  not_found: Option<NotFoundMatcher>,
  not_found_error: Option<SharedError>,
}

impl<R, C> fmt::Debug for AsideBuilder<R, C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsideBuilder")
      .field("remote_ttl", &self.remote_ttl)
      .field("not_found_ttl", &self.not_found_ttl)
      .field("placeholder", &String::from_utf8_lossy(&self.placeholder))
      .field("has_not_found_matcher", &self.not_found.is_some())
      .field("not_found_error", &self.not_found_error)
      .finish_non_exhaustive()
  }
}

impl AsideBuilder {
  /// Creates a new `AsideBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      remote: (),
      codec: JsonCodec,
      remote_ttl: DEFAULT_REMOTE_TTL,
      not_found_ttl: DEFAULT_NOT_FOUND_TTL,
      placeholder: DEFAULT_PLACEHOLDER.to_vec(),
      not_found: None,
      not_found_error: None,
    }
  }
}

impl Default for AsideBuilder {
  fn default() -> Self {
    Self::new()
  }
}

// --- General Configuration Methods ---
impl<R, C> AsideBuilder<R, C> {
  /// Sets the remote store entries are read from and written to.
  pub fn remote<S>(self, remote: S) -> AsideBuilder<S, C> {
    AsideBuilder {
      remote,
      codec: self.codec,
      remote_ttl: self.remote_ttl,
      not_found_ttl: self.not_found_ttl,
      placeholder: self.placeholder,
      not_found: self.not_found,
      not_found_error: self.not_found_error,
    }
  }

  /// Replaces the default JSON codec.
  pub fn codec<D: Codec>(self, codec: D) -> AsideBuilder<R, D> {
    AsideBuilder {
      remote: self.remote,
      codec,
      remote_ttl: self.remote_ttl,
      not_found_ttl: self.not_found_ttl,
      placeholder: self.placeholder,
      not_found: self.not_found,
      not_found_error: self.not_found_error,
    }
  }

  /// Sets how long produced values stay in the remote store.
  pub fn remote_ttl(mut self, ttl: Duration) -> Self {
    self.remote_ttl = ttl;
    self
  }

  /// Sets how long not-found placeholders stay in the remote store.
  pub fn not_found_ttl(mut self, ttl: Duration) -> Self {
    self.not_found_ttl = ttl;
    self
  }

  /// Sets the byte sequence stored for confirmed-absent keys.
  ///
  /// It must never equal the codec's encoding of a real value.
  pub fn not_found_placeholder(mut self, placeholder: impl Into<Vec<u8>>) -> Self {
    self.placeholder = placeholder.into();
    self
  }

  /// Treats a producer error equal to `err` as "not found", and hands `err`
  /// back to callers inside every [`Error::NotFound`](crate::Error::NotFound)
  /// this handle returns.
  ///
  /// `Error::NotFound` itself is always recognized; this adds a domain
  /// specific error on top of it.
  pub fn not_found_error<E>(self, err: E) -> Self
  where
    E: StdError + PartialEq + Send + Sync + 'static,
  {
    let err = Arc::new(err);
    let mut builder = {
      let err = err.clone();
      self.not_found_when(move |candidate: &E| *candidate == *err)
    };
    builder.not_found_error = Some(err);
    builder
  }

  /// Treats a producer error of type `E` for which `pred` holds as "not
  /// found".
  pub fn not_found_when<E, P>(mut self, pred: P) -> Self
  where
    E: StdError + 'static,
    P: Fn(&E) -> bool + Send + Sync + 'static,
  {
    self.not_found = Some(Arc::new(move |err: &(dyn StdError + 'static)| {
      err.downcast_ref::<E>().is_some_and(&pred)
    }));
    self
  }

  /// Applies loaded settings over the current ones. Unset fields are left
  /// alone.
  pub fn config(mut self, config: &AsideConfig) -> Self {
    if let Some(ttl) = config.remote_ttl {
      self.remote_ttl = ttl;
    }
    if let Some(ttl) = config.not_found_ttl {
      self.not_found_ttl = ttl;
    }
    if let Some(placeholder) = &config.placeholder {
      self.placeholder = placeholder.clone().into_bytes();
    }
    self
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.remote_ttl.is_zero() {
      return Err(BuildError::ZeroRemoteTtl);
    }
    if self.not_found_ttl.is_zero() {
      return Err(BuildError::ZeroNotFoundTtl);
    }
    if self.placeholder.is_empty() {
      return Err(BuildError::EmptyPlaceholder);
    }
    Ok(())
  }

  fn build_shared_core(self) -> Result<Arc<AsideShared<R, C>>, BuildError> {
    self.validate()?;
    Ok(Arc::new(AsideShared {
      options: Options {
        remote_ttl: self.remote_ttl,
        not_found_ttl: self.not_found_ttl,
        placeholder: self.placeholder,
        not_found: self.not_found,
        not_found_error: self.not_found_error,
      },
      remote: self.remote,
      codec: self.codec,
      metrics: Metrics::new(),
    }))
  }
}

// --- Build Methods ---
impl<R, C> AsideBuilder<R, C>
where
  C: Codec,
{
  /// Builds a blocking `Aside`.
  pub fn build(self) -> Result<Aside<R, C>, BuildError>
  where
    R: RemoteStore,
  {
    let shared = self.build_shared_core()?;
    Ok(Aside { shared })
  }

  /// Builds an asynchronous `AsyncAside`.
  pub fn build_async(self) -> Result<AsyncAside<R, C>, BuildError>
  where
    R: AsyncRemoteStore,
  {
    let shared = self.build_shared_core()?;
    Ok(AsyncAside { shared })
  }
}
