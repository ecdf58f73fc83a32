//! Cancellable, single-delivery handle to the outcome of an asynchronous call.
//!
//! # Design
//! All transitions happen under one mutex, so delivery and cancellation race
//! exclusively: whichever takes the lock first moves the handle out of
//! `Pending` and the other becomes a no-op. Subscriber callbacks and the
//! cancel hook always run after the lock is released.
//!
//! The outcome is handed out exactly once, either to the subscriber or to a
//! `wait` call.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::Error;

type Callback<T> = Box<dyn FnOnce(Result<T, Error>) + Send>;
type CancelHook = Box<dyn FnOnce() + Send>;

/// Observable state of an `AsyncHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Pending,
    Delivered,
    Cancelled,
    Failed,
}

enum State<T> {
    Pending { subscriber: Option<Callback<T>> },
    /// `None` once the value has been handed out.
    Delivered(Option<T>),
    Failed(Option<Error>),
    Cancelled,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
    on_cancel: Mutex<Option<CancelHook>>,
}

/// Handle to a pending remote result. Clones observe the same call.
pub struct AsyncHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AsyncHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for AsyncHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("state", &self.state())
            .finish()
    }
}

impl<T> AsyncHandle<T> {
    pub(crate) fn pending() -> Self {
        Self::with_state(State::Pending { subscriber: None })
    }

    /// A handle that settled to `failed` before any work started.
    pub(crate) fn failed(err: Error) -> Self {
        Self::with_state(State::Failed(Some(err)))
    }

    fn with_state(state: State<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                settled: Condvar::new(),
                on_cancel: Mutex::new(None),
            }),
        }
    }

    /// Register the action that aborts the in-flight call on `cancel`.
    pub(crate) fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        *self.shared.on_cancel.lock() = Some(Box::new(hook));
    }

    pub fn state(&self) -> HandleState {
        match &*self.shared.state.lock() {
            State::Pending { .. } => HandleState::Pending,
            State::Delivered(_) => HandleState::Delivered,
            State::Failed(_) => HandleState::Failed,
            State::Cancelled => HandleState::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == HandleState::Cancelled
    }

    /// Register the single callback that receives the outcome.
    ///
    /// If the handle already settled with an outcome nobody has taken, the
    /// callback runs immediately on the calling thread. Returns `false` if a
    /// subscriber is already registered, the outcome was already taken, or
    /// the handle was cancelled; the callback is then dropped unused.
    pub fn subscribe<F>(&self, callback: F) -> bool
    where
        F: FnOnce(Result<T, Error>) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        let outcome = match &mut *state {
            State::Pending { subscriber } => {
                if subscriber.is_some() {
                    return false;
                }
                *subscriber = Some(Box::new(callback));
                return true;
            }
            State::Delivered(value) => value.take().map(Ok),
            State::Failed(err) => err.take().map(Err),
            State::Cancelled => None,
        };
        drop(state);

        match outcome {
            Some(outcome) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }

    /// Cancel the call. Returns `false` if the handle had already settled.
    ///
    /// After a successful cancel the subscriber is never invoked, and the
    /// in-flight transport call is aborted on a best-effort basis.
    pub fn cancel(&self) -> bool {
        {
            let mut state = self.shared.state.lock();
            if !matches!(*state, State::Pending { .. }) {
                return false;
            }
            *state = State::Cancelled;
        }
        self.shared.settled.notify_all();
        if let Some(hook) = self.shared.on_cancel.lock().take() {
            hook();
        }
        true
    }

    /// Settle the handle with `outcome`. Returns `false`, dropping the
    /// outcome, if the handle already settled (typically by cancellation).
    pub(crate) fn complete(&self, outcome: Result<T, Error>) -> bool {
        let subscriber = {
            let mut state = self.shared.state.lock();
            let State::Pending { subscriber } = &mut *state else {
                return false;
            };
            match subscriber.take() {
                Some(callback) => {
                    *state = if outcome.is_ok() {
                        State::Delivered(None)
                    } else {
                        State::Failed(None)
                    };
                    Some((callback, outcome))
                }
                None => {
                    *state = match outcome {
                        Ok(value) => State::Delivered(Some(value)),
                        Err(err) => State::Failed(Some(err)),
                    };
                    None
                }
            }
        };
        self.shared.on_cancel.lock().take();
        self.shared.settled.notify_all();
        if let Some((callback, outcome)) = subscriber {
            callback(outcome);
        }
        true
    }

    /// Block until the handle settles and take its outcome.
    pub fn wait(&self) -> Result<T, Error> {
        let mut state = self.shared.state.lock();
        while matches!(*state, State::Pending { .. }) {
            self.shared.settled.wait(&mut state);
        }
        Self::take(&mut state)
    }

    /// Like `wait`, but gives up after `timeout`, returning `None` while the
    /// call is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, Error>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while matches!(*state, State::Pending { .. }) {
            if self.shared.settled.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if matches!(*state, State::Pending { .. }) {
            return None;
        }
        Some(Self::take(&mut state))
    }

    fn take(state: &mut State<T>) -> Result<T, Error> {
        match state {
            State::Delivered(value) => value.take().ok_or(Error::OutcomeTaken),
            State::Failed(err) => Err(err.take().unwrap_or(Error::OutcomeTaken)),
            State::Cancelled => Err(Error::Cancelled),
            State::Pending { .. } => unreachable!("take called on a pending handle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn delivers_to_subscriber_once() {
        let handle = AsyncHandle::<u32>::pending();
        let (tx, rx) = mpsc::channel();
        assert!(handle.subscribe(move |outcome| tx.send(outcome).unwrap()));
        assert!(!handle.subscribe(|_| panic!("second subscriber must not run")));

        assert!(handle.complete(Ok(7)));
        assert_eq!(rx.recv().unwrap(), Ok(7));
        assert_eq!(handle.state(), HandleState::Delivered);
        assert!(!handle.complete(Ok(8)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn late_subscriber_receives_stored_outcome() {
        let handle = AsyncHandle::<&'static str>::pending();
        handle.complete(Ok("done"));
        let (tx, rx) = mpsc::channel();
        assert!(handle.subscribe(move |outcome| tx.send(outcome).unwrap()));
        assert_eq!(rx.recv().unwrap(), Ok("done"));
        assert!(!handle.subscribe(|_| {}));
    }

    #[test]
    fn cancel_wins_over_later_delivery() {
        let handle = AsyncHandle::<u32>::pending();
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        handle.subscribe(move |_| flag.store(true, Ordering::SeqCst));

        let aborted = Arc::new(AtomicBool::new(false));
        let abort_flag = Arc::clone(&aborted);
        handle.on_cancel(move || abort_flag.store(true, Ordering::SeqCst));

        assert!(handle.cancel());
        assert!(aborted.load(Ordering::SeqCst));
        assert!(!handle.complete(Ok(1)));
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(handle.state(), HandleState::Cancelled);
        assert!(!handle.cancel());
        assert_eq!(handle.wait(), Err(Error::Cancelled));
    }

    #[test]
    fn cancel_after_delivery_is_noop() {
        let handle = AsyncHandle::<u32>::pending();
        handle.complete(Ok(3));
        assert!(!handle.cancel());
        assert_eq!(handle.wait(), Ok(3));
        assert_eq!(handle.wait(), Err(Error::OutcomeTaken));
    }

    #[test]
    fn failure_settles_failed() {
        let handle = AsyncHandle::<u32>::pending();
        handle.complete(Err(TransportError::Connect("refused".to_string()).into()));
        assert_eq!(handle.state(), HandleState::Failed);
        assert!(matches!(handle.wait(), Err(Error::Transport(TransportError::Connect(_)))));
    }

    #[test]
    fn pre_failed_handle_reports_error() {
        let handle = AsyncHandle::<u32>::failed(Error::Cancelled);
        assert_eq!(handle.state(), HandleState::Failed);
        assert!(!handle.cancel());
    }

    #[test]
    fn wait_blocks_until_completion_from_other_thread() {
        let handle = AsyncHandle::<u32>::pending();
        let worker = handle.clone();
        let join = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            worker.complete(Ok(42))
        });
        assert_eq!(handle.wait(), Ok(42));
        assert!(join.join().unwrap());
    }

    #[test]
    fn wait_timeout_returns_none_while_pending() {
        let handle = AsyncHandle::<u32>::pending();
        assert!(handle.wait_timeout(Duration::from_millis(10)).is_none());
        handle.complete(Ok(1));
        assert_eq!(handle.wait_timeout(Duration::from_millis(10)), Some(Ok(1)));
    }

    #[test]
    fn racing_cancel_and_complete_settle_exactly_once() {
        for _ in 0..200 {
            let handle = AsyncHandle::<u32>::pending();
            let deliveries = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&deliveries);
            handle.subscribe(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

            let completer = handle.clone();
            let canceller = handle.clone();
            let a = thread::spawn(move || completer.complete(Ok(1)));
            let b = thread::spawn(move || canceller.cancel());
            let completed = a.join().unwrap();
            let cancelled = b.join().unwrap();

            assert!(completed ^ cancelled);
            assert_eq!(deliveries.load(Ordering::SeqCst), usize::from(completed));
        }
    }
}
