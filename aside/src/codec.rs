//! Value <-> bytes conversion for entries stored remotely.

use crate::error::CodecError;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts typed values to and from the bytes kept in the remote store.
///
/// Implementations must round-trip: decoding the output of `marshal(v)` yields
/// a value equal to `v`. They must also never produce the configured not-found
/// placeholder for a real value. The orchestrator refuses to persist such a
/// value rather than silently turning it into a negative entry.
pub trait Codec: Send + Sync + 'static {
  fn marshal<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
  where
    T: Serialize + ?Sized;

  fn unmarshal<T>(&self, data: &[u8]) -> Result<T, CodecError>
  where
    T: DeserializeOwned;
}

/// The default codec: JSON via `serde_json`.
///
/// JSON output is never a bare `*`, so it is safe with the default placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
  fn marshal<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
  where
    T: Serialize + ?Sized,
  {
    serde_json::to_vec(value).map_err(CodecError::encode)
  }

  fn unmarshal<T>(&self, data: &[u8]) -> Result<T, CodecError>
  where
    T: DeserializeOwned,
  {
    serde_json::from_slice(data).map_err(CodecError::decode)
  }
}

/// A compact binary codec backed by `bincode`.
///
/// Small values can encode to a single byte, so pick a placeholder that is not
/// a valid encoding of the cached type (for example a multi-byte sentinel).
#[cfg(feature = "bincode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

#[cfg(feature = "bincode")]
impl Codec for BincodeCodec {
  fn marshal<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
  where
    T: Serialize + ?Sized,
  {
    bincode::serialize(value).map_err(CodecError::encode)
  }

  fn unmarshal<T>(&self, data: &[u8]) -> Result<T, CodecError>
  where
    T: DeserializeOwned,
  {
    bincode::deserialize(data).map_err(CodecError::decode)
  }
}
