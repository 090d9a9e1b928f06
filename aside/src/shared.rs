use crate::builder::NotFoundMatcher;
use crate::codec::Codec;
use crate::dedup::Outcome;
use crate::error::{CodecError, Error, RemoteError, SharedError};
use crate::metrics::Metrics;

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Immutable settings fixed at build time.
pub(crate) struct Options {
  pub(crate) remote_ttl: Duration,
  pub(crate) not_found_ttl: Duration,
  pub(crate) placeholder: Vec<u8>,
  pub(crate) not_found: Option<NotFoundMatcher>,
  pub(crate) not_found_error: Option<SharedError>,
}

impl Options {
  /// Whether a producer error signals absence. [`Error::NotFound`] always
  /// does.
  pub(crate) fn is_not_found(&self, err: &(dyn StdError + 'static)) -> bool {
    if let Some(Error::NotFound(_)) = err.downcast_ref::<Error>() {
      return true;
    }
    self.not_found.as_ref().is_some_and(|matcher| matcher(err))
  }

  /// The error handed to callers for a confirmed-absent key.
  pub(crate) fn not_found(&self) -> Error {
    Error::NotFound(self.not_found_error.clone())
  }
}

/// The internal core shared by every clone of an `Aside` or `AsyncAside`.
pub(crate) struct AsideShared<R, C> {
  pub(crate) options: Options,
  pub(crate) remote: R,
  pub(crate) codec: C,
  pub(crate) metrics: Metrics,
}

impl<R, C> fmt::Debug for AsideShared<R, C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsideShared")
      .field("remote_ttl", &self.options.remote_ttl)
      .field("not_found_ttl", &self.options.not_found_ttl)
      .field(
        "placeholder",
        &String::from_utf8_lossy(&self.options.placeholder),
      )
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

/// What a remote lookup turned up, once placeholders and infrastructure
/// failures have been split off.
pub(crate) enum Fetched<T> {
  Hit(T),
  Miss,
  /// The entry exists but does not decode. The caller purges it.
  Corrupt(CodecError),
}

/// A producer's outcome, classified.
pub(crate) enum Produced<T> {
  Value(T),
  Absent,
  Failed(Error),
}

impl<R, C: Codec> AsideShared<R, C> {
  /// Classifies the reply of a remote `get`.
  ///
  /// The placeholder is compared before any decode attempt, so a payload that
  /// happens to decode is never mistaken for a value.
  pub(crate) fn inspect<T>(
    &self,
    key: &str,
    fetched: Result<Vec<u8>, RemoteError>,
    is_nil: impl FnOnce(&RemoteError) -> bool,
  ) -> Result<Fetched<T>, Error>
  where
    T: DeserializeOwned,
  {
    let data = match fetched {
      Ok(data) => data,
      Err(err) if is_nil(&err) => {
        Metrics::incr(&self.metrics.misses);
        tracing::trace!(key = %key, "remote miss");
        return Ok(Fetched::Miss);
      }
      Err(err) => {
        Metrics::incr(&self.metrics.remote_errors);
        return Err(Error::Remote(err));
      }
    };

    if data == self.options.placeholder {
      Metrics::incr(&self.metrics.negative_hits);
      tracing::trace!(key = %key, "remote hit on not-found placeholder");
      return Err(self.options.not_found());
    }

    match self.codec.unmarshal::<T>(&data) {
      Ok(value) => {
        Metrics::incr(&self.metrics.hits);
        tracing::trace!(key = %key, "remote hit");
        Ok(Fetched::Hit(value))
      }
      Err(err) => {
        Metrics::incr(&self.metrics.purged);
        tracing::warn!(key = %key, error = %err, "purging undecodable remote entry");
        Ok(Fetched::Corrupt(err))
      }
    }
  }

  /// Splits a producer result into value, absence or failure.
  pub(crate) fn classify<T, E>(&self, produced: Result<Option<T>, E>) -> Produced<T>
  where
    E: StdError + Send + Sync + 'static,
  {
    match produced {
      Ok(Some(value)) => Produced::Value(value),
      Ok(None) => Produced::Absent,
      Err(err) if self.options.is_not_found(&err) => Produced::Absent,
      Err(err) => Produced::Failed(Error::from_producer(err)),
    }
  }

  /// Encodes a produced value, refusing encodings that would read back as the
  /// placeholder.
  pub(crate) fn encode<T>(&self, value: &T) -> Result<Vec<u8>, Error>
  where
    T: Serialize,
  {
    let data = self.codec.marshal(value)?;
    if data == self.options.placeholder {
      return Err(CodecError::PlaceholderCollision.into());
    }
    Ok(data)
  }

  /// Accounts for the outcome a leader is about to publish.
  pub(crate) fn record_outcome<T>(&self, key: &str, outcome: &Outcome<T>) {
    match outcome {
      Ok(_) => {
        Metrics::incr(&self.metrics.stored);
        tracing::debug!(
          key = %key,
          ttl = %humantime::format_duration(self.options.remote_ttl),
          "stored produced value"
        );
      }
      Err(Error::NotFound(_)) => {}
      Err(err) => {
        Metrics::incr(&self.metrics.load_failures);
        tracing::debug!(key = %key, error = %err, "load failed");
      }
    }
  }

  pub(crate) fn record_negative(&self, key: &str) {
    Metrics::incr(&self.metrics.negative_stored);
    tracing::debug!(
      key = %key,
      ttl = %humantime::format_duration(self.options.not_found_ttl),
      "cached not-found placeholder"
    );
  }
}
