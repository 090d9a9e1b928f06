use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

/// Someone parked on a [`Flight`] (or on a cancellation signal).
pub(crate) enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  pub(crate) fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }

  /// Pushes an async waker unless an equivalent one is already queued.
  pub(crate) fn register_waker(waiters: &mut VecDeque<Waiter>, waker: &Waker) {
    let queued = waiters.iter().any(|w| match w {
      Waiter::Async(existing) => existing.will_wake(waker),
      Waiter::Sync(_) => false,
    });
    if !queued {
      waiters.push_back(Waiter::Async(waker.clone()));
    }
  }

  /// Drops any queued waker equivalent to `waker`.
  pub(crate) fn forget_waker(waiters: &mut VecDeque<Waiter>, waker: &Waker) {
    waiters.retain(|w| match w {
      Waiter::Async(existing) => !existing.will_wake(waker),
      Waiter::Sync(_) => true,
    });
  }

  /// Pushes the current thread unless it is already queued.
  pub(crate) fn register_current_thread(waiters: &mut VecDeque<Waiter>) {
    let current = thread::current();
    let queued = waiters.iter().any(|w| match w {
      Waiter::Sync(existing) => existing.id() == current.id(),
      Waiter::Async(_) => false,
    });
    if !queued {
      waiters.push_back(Waiter::Sync(current));
    }
  }

  pub(crate) fn forget_current_thread(waiters: &mut VecDeque<Waiter>) {
    let current = thread::current().id();
    waiters.retain(|w| match w {
      Waiter::Sync(existing) => existing.id() != current,
      Waiter::Async(_) => true,
    });
  }
}

enum State<V> {
  Pending,
  Complete(V),
}

struct Inner<V> {
  state: State<V>,
  waiters: VecDeque<Waiter>,
}

/// The single outcome of one in-flight load.
///
/// It is completed exactly once by the leader and can be awaited by any mix of
/// blocked threads and async tasks at the same time.
pub(crate) struct Flight<V> {
  inner: Mutex<Inner<V>>,
}

impl<V: Clone> Flight<V> {
  /// Creates a new `Flight` in the pending state.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Pending,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the flight, waking all waiters. Only the first call has any
  /// effect.
  pub(crate) fn complete(&self, value: V) {
    let waiters = {
      let mut inner = self.inner.lock();
      if let State::Complete(_) = inner.state {
        return;
      }
      inner.state = State::Complete(value);
      std::mem::take(&mut inner.waiters)
    };
    for waiter in waiters {
      waiter.wake();
    }
  }

  /// Returns the outcome if complete, otherwise queues the current thread to be
  /// unparked on completion.
  pub(crate) fn poll_blocking(&self) -> Option<V> {
    let mut inner = self.inner.lock();
    match &inner.state {
      State::Complete(value) => Some(value.clone()),
      State::Pending => {
        Waiter::register_current_thread(&mut inner.waiters);
        None
      }
    }
  }

  /// Stops unparking the current thread, for a blocked waiter giving up early.
  pub(crate) fn forget_blocking(&self) {
    Waiter::forget_current_thread(&mut self.inner.lock().waiters);
  }

  #[cfg(test)]
  pub(crate) fn is_complete(&self) -> bool {
    matches!(self.inner.lock().state, State::Complete(_))
  }
}

/// Future resolving to the outcome of a [`Flight`].
#[must_use = "futures do nothing unless you .await or poll them"]
pub(crate) struct FlightWait<V> {
  flight: Arc<Flight<V>>,
  registered: Option<Waker>,
}

impl<V> FlightWait<V> {
  pub(crate) fn new(flight: Arc<Flight<V>>) -> Self {
    Self {
      flight,
      registered: None,
    }
  }
}

impl<V: Clone> Future for FlightWait<V> {
  type Output = V;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    {
      let mut inner = self.flight.inner.lock();
      match &inner.state {
        State::Complete(value) => return Poll::Ready(value.clone()),
        State::Pending => Waiter::register_waker(&mut inner.waiters, cx.waker()),
      }
    }
    self.registered = Some(cx.waker().clone());
    Poll::Pending
  }
}

impl<V> Drop for FlightWait<V> {
  fn drop(&mut self) {
    if let Some(waker) = self.registered.take() {
      Waiter::forget_waker(&mut self.flight.inner.lock().waiters, &waker);
    }
  }
}
