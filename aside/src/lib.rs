//! A cache-aside load combinator over a remote key-value store.
//!
//! `resolve(key, producer)` reads the value for `key` from the remote store
//! and, only on a miss, computes it with `producer`, stores it with a TTL and
//! returns it.
//!
//! # Features
//! - **Thundering-herd protection**: concurrent misses for the same key run the
//!   producer once for the whole process, across every handle and call site.
//!   All other callers receive the leader's outcome.
//! - **Negative caching**: a producer reporting absence stores a short-lived
//!   placeholder, so repeated lookups for missing keys stay cheap.
//! - **Self-healing**: an entry that no longer decodes is deleted, and the next
//!   call recomputes it.
//! - **Sync & Async**: a blocking [`Aside`] and an `async` [`AsyncAside`] share
//!   one dedup registry; a blocked thread may wait on a task's load and vice
//!   versa.
//! - **Cancellation**: every call takes a [`Context`] whose deadline or cancel
//!   signal stops waits and store I/O without disturbing other callers.
//!
//! ```
//! use fibre_aside::{AsideBuilder, Context, Error, MemoryStore};
//!
//! let aside = AsideBuilder::new().remote(MemoryStore::new()).build().unwrap();
//! let ctx = Context::background();
//!
//! let greeting = aside
//!   .resolve(&ctx, "greeting:en", |_ctx| Ok::<_, Error>(Some("hello".to_string())))
//!   .unwrap();
//! assert_eq!(*greeting, "hello");
//!
//! let missing = aside.resolve(&ctx, "greeting:xx", |_ctx| Ok::<Option<String>, Error>(None));
//! assert!(matches!(missing, Err(Error::NotFound(_))));
//! ```

// Public modules that form the API
pub mod builder;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod handles;
pub mod metrics;
pub mod remote;

// Internal, crate-only modules
mod dedup;
mod flight;
mod shared;
mod timer;

// Re-export the primary user-facing types for convenience
pub use builder::AsideBuilder;
#[cfg(feature = "bincode")]
pub use codec::BincodeCodec;
pub use codec::{Codec, JsonCodec};
pub use config::AsideConfig;
pub use context::Context;
pub use dedup::in_flight;
pub use error::{BuildError, CodecError, Error, RemoteError, Result};
pub use handles::{Aside, AsyncAside};
pub use metrics::MetricsSnapshot;
pub use remote::{AsyncRemoteStore, MemoryStore, RemoteStore};
#[cfg(feature = "redis")]
pub use remote::{BlockingRedisStore, RedisStore};
