//! Caller-scoped cancellation and deadlines.
//!
//! A [`Context`] travels with a resolve call. It is passed to blocking store
//! adapters and to the producer, and the orchestrator races its own waits
//! against it. Clones share the same cancel flag.
//!
//! Deadlines are tracked by a crate-owned timer thread, so [`Context::done`]
//! and [`Context::run`] work under any executor.

use crate::error::Error;
use crate::flight::Waiter;
use crate::timer::{self, TimerKey};

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::Arc;
use std::task::{Poll, Waker};
use std::time::{Duration, Instant};

use futures_util::future::{self, Either};
use parking_lot::Mutex;

struct CancelState {
  cancelled: bool,
  waiters: VecDeque<Waiter>,
}

struct ContextInner {
  deadline: Option<Instant>,
  cancel: Mutex<CancelState>,
}

#[derive(Clone)]
pub struct Context {
  inner: Arc<ContextInner>,
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context")
      .field("deadline", &self.inner.deadline)
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

impl Default for Context {
  fn default() -> Self {
    Self::background()
  }
}

impl Context {
  fn with_optional_deadline(deadline: Option<Instant>) -> Self {
    Self {
      inner: Arc::new(ContextInner {
        deadline,
        cancel: Mutex::new(CancelState {
          cancelled: false,
          waiters: VecDeque::new(),
        }),
      }),
    }
  }

  /// A context with no deadline that is only done once cancelled.
  pub fn background() -> Self {
    Self::with_optional_deadline(None)
  }

  pub fn with_deadline(deadline: Instant) -> Self {
    Self::with_optional_deadline(Some(deadline))
  }

  /// A context that expires after `timeout`. A timeout too large to
  /// represent as an `Instant` means no deadline at all.
  pub fn with_timeout(timeout: Duration) -> Self {
    Self::with_optional_deadline(Instant::now().checked_add(timeout))
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.inner.deadline
  }

  /// Cancels this context and every clone of it, waking anyone waiting on it.
  pub fn cancel(&self) {
    let waiters = {
      let mut state = self.inner.cancel.lock();
      if state.cancelled {
        return;
      }
      state.cancelled = true;
      std::mem::take(&mut state.waiters)
    };
    for waiter in waiters {
      waiter.wake();
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.cancel.lock().cancelled
  }

  /// Why this context is done, if it is.
  ///
  /// Cancellation takes precedence over an elapsed deadline.
  pub fn err(&self) -> Option<Error> {
    if self.is_cancelled() {
      return Some(Error::Cancelled);
    }
    match self.inner.deadline {
      Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
      _ => None,
    }
  }

  /// Time left until the deadline, `None` if there is no deadline.
  pub(crate) fn remaining(&self) -> Option<Duration> {
    self
      .inner
      .deadline
      .map(|deadline| deadline.saturating_duration_since(Instant::now()))
  }

  /// Queues the current thread to be unparked on cancellation.
  pub(crate) fn park_on_cancel(&self) {
    let mut state = self.inner.cancel.lock();
    if !state.cancelled {
      Waiter::register_current_thread(&mut state.waiters);
    }
  }

  /// Stops unparking the current thread on cancellation.
  pub(crate) fn unpark_on_cancel_done(&self) {
    Waiter::forget_current_thread(&mut self.inner.cancel.lock().waiters);
  }

  /// A future that resolves once the context is cancelled or its deadline
  /// passes.
  pub fn done(&self) -> Done<'_> {
    Done {
      ctx: self,
      registered: None,
      timer: None,
    }
  }

  /// Runs `fut` to completion unless the context is done first, in which case
  /// `fut` is dropped.
  pub async fn run<F>(&self, fut: F) -> Result<F::Output, Error>
  where
    F: Future,
  {
    if let Some(err) = self.err() {
      return Err(err);
    }
    let fut = pin!(fut);
    let done = pin!(self.done());
    match future::select(fut, done).await {
      Either::Left((output, _)) => Ok(output),
      Either::Right((err, _)) => Err(err),
    }
  }
}

/// Future returned by [`Context::done`].
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct Done<'a> {
  ctx: &'a Context,
  registered: Option<Waker>,
  timer: Option<TimerKey>,
}

impl Future for Done<'_> {
  type Output = Error;

  fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
    {
      let mut state = self.ctx.inner.cancel.lock();
      if state.cancelled {
        return Poll::Ready(Error::Cancelled);
      }
      Waiter::register_waker(&mut state.waiters, cx.waker());
    }
    let same_waker = self
      .registered
      .as_ref()
      .is_some_and(|waker| waker.will_wake(cx.waker()));
    self.registered = Some(cx.waker().clone());

    if let Some(deadline) = self.ctx.inner.deadline {
      if Instant::now() >= deadline {
        return Poll::Ready(Error::DeadlineExceeded);
      }
      if !same_waker || self.timer.is_none() {
        if let Some(key) = self.timer.take() {
          timer::cancel(key);
        }
        self.timer = Some(timer::register(deadline, cx.waker()));
      }
    }
    Poll::Pending
  }
}

impl Drop for Done<'_> {
  fn drop(&mut self) {
    if let Some(key) = self.timer.take() {
      timer::cancel(key);
    }
    if let Some(waker) = self.registered.take() {
      Waiter::forget_waker(&mut self.ctx.inner.cancel.lock().waiters, &waker);
    }
  }
}
