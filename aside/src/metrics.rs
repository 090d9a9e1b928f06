use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for an `Aside` handle.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub struct Metrics {
  // --- Remote lookups ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) negative_hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) remote_errors: CachePadded<AtomicU64>,
  pub(crate) purged: CachePadded<AtomicU64>,

  // --- Loads ---
  pub(crate) loads: CachePadded<AtomicU64>,
  pub(crate) coalesced: CachePadded<AtomicU64>,
  pub(crate) load_failures: CachePadded<AtomicU64>,

  // --- Writes ---
  pub(crate) stored: CachePadded<AtomicU64>,
  pub(crate) negative_stored: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      negative_hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      remote_errors: CachePadded::new(AtomicU64::new(0)),
      purged: CachePadded::new(AtomicU64::new(0)),
      loads: CachePadded::new(AtomicU64::new(0)),
      coalesced: CachePadded::new(AtomicU64::new(0)),
      load_failures: CachePadded::new(AtomicU64::new(0)),
      stored: CachePadded::new(AtomicU64::new(0)),
      negative_stored: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let negative_hits = self.negative_hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let answered = hits + negative_hits;
    let total_lookups = answered + misses;

    MetricsSnapshot {
      hits,
      negative_hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        answered as f64 / total_lookups as f64
      },
      remote_errors: self.remote_errors.load(Ordering::Relaxed),
      purged: self.purged.load(Ordering::Relaxed),
      loads: self.loads.load(Ordering::Relaxed),
      coalesced: self.coalesced.load(Ordering::Relaxed),
      load_failures: self.load_failures.load(Ordering::Relaxed),
      stored: self.stored.load(Ordering::Relaxed),
      negative_stored: self.negative_stored.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of an `Aside` handle's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Lookups answered by a stored value.
  pub hits: u64,
  /// Lookups answered by a not-found placeholder.
  pub negative_hits: u64,
  /// Lookups that found nothing and fell through to a load.
  pub misses: u64,
  /// Share of lookups answered by the remote store, positive or negative.
  pub hit_ratio: f64,
  /// Lookups that failed with an infrastructure error.
  pub remote_errors: u64,
  /// Corrupt entries deleted after failing to decode.
  pub purged: u64,
  /// Producer executions (one per elected leader).
  pub loads: u64,
  /// Callers that joined a load already in flight instead of starting one.
  pub coalesced: u64,
  /// Loads whose outcome was an error other than not-found.
  pub load_failures: u64,
  /// Values written to the remote store.
  pub stored: u64,
  /// Not-found placeholders written to the remote store.
  pub negative_stored: u64,
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("negative_hits", &self.negative_hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("remote_errors", &self.remote_errors)
      .field("purged", &self.purged)
      .field("loads", &self.loads)
      .field("coalesced", &self.coalesced)
      .field("load_failures", &self.load_failures)
      .field("stored", &self.stored)
      .field("negative_stored", &self.negative_stored)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
