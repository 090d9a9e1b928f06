//! A process-wide deadline timer that needs no async runtime.
//!
//! One background thread sleeps until the earliest registered deadline and
//! wakes whichever tasks registered for it. Registrations are withdrawn when
//! the waiting future is dropped, so far-off deadlines do not pile up.

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::Waker;
use std::thread;
use std::time::Instant;

static TIMER: Lazy<Arc<Timer>> = Lazy::new(|| {
  let timer = Arc::new(Timer::default());
  let worker = timer.clone();
  let spawned = thread::Builder::new()
    .name("fibre-aside-timer".to_string())
    .spawn(move || worker.run());
  if let Err(err) = spawned {
    tracing::error!(error = %err, "failed to spawn deadline timer thread");
  }
  timer
});

/// Identifies one registration. Ordered by deadline, then registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TimerKey {
  deadline: Instant,
  id: u64,
}

#[derive(Default)]
struct Timer {
  entries: Mutex<BTreeMap<TimerKey, Waker>>,
  wakeup: Condvar,
  next_id: AtomicU64,
}

impl Timer {
  fn run(&self) {
    let mut entries = self.entries.lock();
    loop {
      let due = Self::take_due(&mut entries, Instant::now());
      if !due.is_empty() {
        MutexGuard::unlocked(&mut entries, || due.into_iter().for_each(Waker::wake));
        continue;
      }

      match entries.keys().next().map(|key| key.deadline) {
        Some(deadline) => {
          self.wakeup.wait_until(&mut entries, deadline);
        }
        None => self.wakeup.wait(&mut entries),
      }
    }
  }

  fn take_due(entries: &mut BTreeMap<TimerKey, Waker>, now: Instant) -> Vec<Waker> {
    let mut due = Vec::new();
    while let Some(entry) = entries.first_entry() {
      if entry.key().deadline > now {
        break;
      }
      due.push(entry.remove());
    }
    due
  }
}

/// Arranges for `waker` to be woken once `deadline` has passed.
pub(crate) fn register(deadline: Instant, waker: &Waker) -> TimerKey {
  let timer = &**TIMER;
  let key = TimerKey {
    deadline,
    id: timer.next_id.fetch_add(1, Ordering::Relaxed),
  };

  let mut entries = timer.entries.lock();
  let earliest = match entries.keys().next() {
    Some(first) => key < *first,
    None => true,
  };
  entries.insert(key, waker.clone());
  drop(entries);

  // The worker only needs a nudge when its current sleep is now too long.
  if earliest {
    timer.wakeup.notify_one();
  }
  key
}

/// Withdraws a registration. A no-op if it already fired.
pub(crate) fn cancel(key: TimerKey) {
  TIMER.entries.lock().remove(&key);
}
