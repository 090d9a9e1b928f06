use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A shareable, type-erased error. Outcomes are broadcast to every waiter of a
/// load, so anything carried inside [`Error`] must be cheap to clone.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur when building an `Aside` handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// Positive entries must live for a non-zero duration.
  ZeroRemoteTtl,
  /// Negative (not-found) entries must live for a non-zero duration.
  ZeroNotFoundTtl,
  /// The not-found placeholder cannot be an empty byte sequence.
  EmptyPlaceholder,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroRemoteTtl => write!(f, "remote ttl cannot be zero"),
      BuildError::ZeroNotFoundTtl => write!(f, "not-found ttl cannot be zero"),
      BuildError::EmptyPlaceholder => write!(f, "not-found placeholder cannot be empty"),
    }
  }
}

impl std::error::Error for BuildError {}

/// Failures reported by a remote store.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
  /// The key has no entry (never written, expired or evicted).
  #[error("key is absent from the remote store")]
  Nil,
  /// Any transport or backend failure.
  #[error("remote store backend error: {0}")]
  Backend(SharedError),
}

impl RemoteError {
  /// Wraps a backend specific error.
  pub fn backend<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    RemoteError::Backend(Arc::new(err))
  }

  #[inline]
  pub fn is_nil(&self) -> bool {
    matches!(self, RemoteError::Nil)
  }
}

/// Serialization failures.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
  #[error("failed to encode value: {0}")]
  Encode(SharedError),
  #[error("failed to decode value: {0}")]
  Decode(SharedError),
  /// The encoded form of a real value is byte-for-byte the not-found
  /// placeholder. Persisting it would turn the value into a negative entry.
  #[error("encoded value collides with the not-found placeholder")]
  PlaceholderCollision,
}

impl CodecError {
  pub fn encode<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    CodecError::Encode(Arc::new(err))
  }

  pub fn decode<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    CodecError::Decode(Arc::new(err))
  }
}

/// The error returned by a resolve call.
///
/// `NotFound` is not a failure of the system: it means the key is confirmed
/// absent, either from a cached placeholder or from the producer itself. It
/// carries the not-found error configured on the builder, if any; match on
/// the variant, not on its payload.
#[derive(Debug, Clone, Error)]
pub enum Error {
  #[error("not found")]
  NotFound(Option<SharedError>),
  #[error(transparent)]
  Remote(#[from] RemoteError),
  #[error(transparent)]
  Codec(#[from] CodecError),
  #[error("producer failed: {0}")]
  Producer(SharedError),
  #[error("operation cancelled")]
  Cancelled,
  #[error("deadline exceeded")]
  DeadlineExceeded,
  /// The leader of an in-flight load went away (its future was dropped or it
  /// panicked) before producing an outcome.
  #[error("in-flight load was abandoned by its leader")]
  Abandoned,
  /// A load for this key is already in flight, producing a different type.
  #[error("in-flight load for key '{key}' produces a different value type")]
  TypeMismatch { key: String },
}

impl Error {
  /// A bare not-found error, for producers to signal absence.
  #[inline]
  pub fn not_found() -> Self {
    Error::NotFound(None)
  }

  #[inline]
  pub fn is_not_found(&self) -> bool {
    matches!(self, Error::NotFound(_))
  }

  /// The configured not-found error carried by a [`Error::NotFound`].
  ///
  /// ```
  /// # use fibre_aside::Error;
  /// assert!(Error::not_found().not_found_source().is_none());
  /// assert!(Error::Cancelled.not_found_source().is_none());
  /// ```
  pub fn not_found_source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
    match self {
      Error::NotFound(source) => source.as_deref(),
      _ => None,
    }
  }

  /// Converts an arbitrary producer error. Errors that already are an
  /// [`Error`] pass through unchanged.
  pub(crate) fn from_producer<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    let boxed: Box<dyn StdError + Send + Sync> = Box::new(err);
    match boxed.downcast::<Error>() {
      Ok(err) => *err,
      Err(other) => Error::Producer(Arc::from(other)),
    }
  }
}

/// A specialized `Result` type for resolve operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
