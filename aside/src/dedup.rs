//! The process-wide dedup registry.
//!
//! Every handle, blocking or async, coordinates through the same registry so
//! that unrelated call sites using the same key share one producer execution.
//! A registration lives from leader election until the leader finishes (or is
//! dropped), after which the next caller for the key starts a fresh cycle.

use crate::error::Error;
use crate::flight::Flight;

use std::any::Any;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// What every caller attached to a flight receives.
pub(crate) type Outcome<T> = Result<Arc<T>, Error>;

type AnyFlight = Arc<dyn Any + Send + Sync>;

struct Registry {
  shards: Box<[Mutex<HashMap<String, AnyFlight>>]>,
  hasher: ahash::RandomState,
}

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

impl Registry {
  fn new() -> Self {
    // Power of two for fast bitwise ANDing.
    let shards = (num_cpus::get() * 4).max(1).next_power_of_two();
    Self {
      shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
      hasher: ahash::RandomState::new(),
    }
  }

  fn shard(&self, key: &str) -> &Mutex<HashMap<String, AnyFlight>> {
    let hash = self.hasher.hash_one(key);
    &self.shards[hash as usize & (self.shards.len() - 1)]
  }
}

/// The role a caller gets when entering the coordinator for a key.
pub(crate) enum Join<T: Send + Sync + 'static> {
  /// No load was in flight; the caller must run the producer and finish the
  /// guard.
  Leader(LeaderGuard<T>),
  /// A load is in flight; the caller waits on its outcome.
  Waiter(Arc<Flight<Outcome<T>>>),
}

/// Registers the caller for `key`: as the leader of a new flight, or as a
/// waiter on the one already pending. The check and the insert happen under
/// one shard lock.
pub(crate) fn join<T>(key: &str) -> Result<Join<T>, Error>
where
  T: Send + Sync + 'static,
{
  let mut pending = REGISTRY.shard(key).lock();

  if let Some(existing) = pending.get(key) {
    return match existing.clone().downcast::<Flight<Outcome<T>>>() {
      Ok(flight) => Ok(Join::Waiter(flight)),
      Err(_) => Err(Error::TypeMismatch {
        key: key.to_string(),
      }),
    };
  }

  let flight: Arc<Flight<Outcome<T>>> = Arc::new(Flight::new());
  pending.insert(key.to_string(), flight.clone() as AnyFlight);
  Ok(Join::Leader(LeaderGuard {
    key: key.to_string(),
    flight,
    finished: false,
  }))
}

/// Whether a load for `key` is currently in flight anywhere in the process.
pub fn in_flight(key: &str) -> bool {
  REGISTRY.shard(key).lock().contains_key(key)
}

/// Held by the elected leader while it runs the producer.
///
/// If the guard is dropped without [`LeaderGuard::finish`] (the leader's
/// future was dropped or its thread panicked) the registration is removed and
/// every waiter receives [`Error::Abandoned`].
pub(crate) struct LeaderGuard<T: Send + Sync + 'static> {
  key: String,
  flight: Arc<Flight<Outcome<T>>>,
  finished: bool,
}

impl<T: Send + Sync + 'static> LeaderGuard<T> {
  /// Publishes the outcome to every waiter and unregisters the flight.
  pub(crate) fn finish(mut self, outcome: Outcome<T>) -> Outcome<T> {
    self.finished = true;
    self.release(outcome.clone());
    outcome
  }

  fn release(&self, outcome: Outcome<T>) {
    {
      let mut pending = REGISTRY.shard(&self.key).lock();
      let ours = pending
        .get(&self.key)
        .is_some_and(|f| Arc::as_ptr(f) as *const () == Arc::as_ptr(&self.flight) as *const ());
      if ours {
        pending.remove(&self.key);
      }
    }
    self.flight.complete(outcome);
  }
}

impl<T: Send + Sync + 'static> Drop for LeaderGuard<T> {
  fn drop(&mut self) {
    if !self.finished {
      tracing::warn!(key = %self.key, "leader abandoned in-flight load");
      self.release(Err(Error::Abandoned));
    }
  }
}
