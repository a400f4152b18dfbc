//! The settle-once promise.
//!
//! A [`Promise`] starts pending and is settled exactly once, either resolved
//! with a value or rejected with an error. Continuations may be attached at
//! any time: before settlement they are queued, after settlement they run
//! immediately on the attaching thread.
//!
//! ```text
//! Pending ──resolve──▶ Resolved ──┐
//!    │                            ├──on_finally──▶ Finalized
//!    └────reject────▶ Rejected ───┘
//! ```

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::SettleError;

type ResolveFn<T> = Box<dyn FnOnce(&T) + Send>;
type RejectFn<E> = Box<dyn FnOnce(&E) + Send>;
type FinallyFn = Box<dyn FnOnce() + Send>;
type SettledFn<T, E> = Box<dyn FnOnce(Result<&T, &E>) + Send>;

/// Observable lifecycle state of a [`Promise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Resolved,
    /// Settled with an error.
    Rejected,
    /// Settled, and the finalize continuations have run.
    Finalized,
}

enum Slot<T, E> {
    Pending,
    Resolved(Arc<T>),
    Rejected(Arc<E>),
}

struct Inner<T, E> {
    slot: Slot<T, E>,
    finalized: bool,
    // Set while the settling thread runs resolve/reject continuations.
    // Finalization waits for it to clear.
    delivering: bool,
    resolvers: Vec<ResolveFn<T>>,
    rejectors: Vec<RejectFn<E>>,
    finalizers: Vec<FinallyFn>,
    observers: Vec<SettledFn<T, E>>,
}

impl<T, E> Inner<T, E> {
    fn outcome(&self) -> Option<Result<Arc<T>, Arc<E>>> {
        match &self.slot {
            Slot::Pending => None,
            Slot::Resolved(value) => Some(Ok(Arc::clone(value))),
            Slot::Rejected(error) => Some(Err(Arc::clone(error))),
        }
    }

    fn state(&self) -> State {
        match (&self.slot, self.finalized) {
            (Slot::Pending, _) => State::Pending,
            (_, true) => State::Finalized,
            (Slot::Resolved(_), false) => State::Resolved,
            (Slot::Rejected(_), false) => State::Rejected,
        }
    }
}

/// A thread-safe container settled at most once.
///
/// Cloning a `Promise` yields another handle to the same settlement; the
/// underlying state is dropped with the last handle.
///
/// Continuations run synchronously on whichever thread settles the promise
/// (or on the attaching thread if it is already settled). They run with the
/// internal lock released, so a continuation may attach further
/// continuations, but it must not settle the promise it is attached to.
///
/// # Example
///
/// ```rust
/// use duplex_settle::Promise;
///
/// let promise: Promise<i64, String> = Promise::new();
/// promise
///     .on_resolve(|value| assert_eq!(*value, 5))
///     .unwrap()
///     .on_reject(|error| panic!("unexpected: {error}"))
///     .unwrap();
///
/// assert!(promise.resolve(5));
/// assert!(!promise.resolve(6));
/// ```
pub struct Promise<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for Promise<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Promise")
            .field("state", &inner.state())
            .field("resolvers", &inner.resolvers.len())
            .field("rejectors", &inner.rejectors.len())
            .field("finalizers", &inner.finalizers.len())
            .finish()
    }
}

impl<T, E> Promise<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create a pending promise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                slot: Slot::Pending,
                finalized: false,
                delivering: false,
                resolvers: Vec::new(),
                rejectors: Vec::new(),
                finalizers: Vec::new(),
                observers: Vec::new(),
            })),
        }
    }

    /// Create a promise already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        let promise = Self::new();
        promise.resolve(value);
        promise
    }

    /// Create a promise already rejected with `error`.
    pub fn rejected(error: E) -> Self {
        let promise = Self::new();
        promise.reject(error);
        promise
    }

    /// Create a settled promise from a `Result`.
    pub fn from_result(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::resolved(value),
            Err(error) => Self::rejected(error),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        // Continuations never run under the lock, so a poisoned guard still
        // holds consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.lock().state()
    }

    /// True until resolved or rejected.
    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// True once resolved or rejected, including after finalization.
    pub fn is_settled(&self) -> bool {
        self.state() != State::Pending
    }

    /// Whether both handles point at the same settlement.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Settle with a value.
    ///
    /// Runs every resolve continuation in registration order, then the
    /// finalize continuations if any were attached. Returns `false` (and does
    /// nothing) if the promise was already settled.
    pub fn resolve(&self, value: T) -> bool {
        let value = Arc::new(value);
        let (resolvers, observers) = {
            let mut inner = self.lock();
            if !matches!(inner.slot, Slot::Pending) {
                return false;
            }
            inner.slot = Slot::Resolved(Arc::clone(&value));
            inner.delivering = true;
            inner.rejectors.clear();
            (
                mem::take(&mut inner.resolvers),
                mem::take(&mut inner.observers),
            )
        };

        let delivery = Delivery(self);
        for resolve in resolvers {
            resolve(&value);
        }
        for observe in observers {
            observe(Ok(&value));
        }
        delivery.finish();
        true
    }

    /// Settle with an error. The mirror image of [`resolve`](Self::resolve).
    pub fn reject(&self, error: E) -> bool {
        let error = Arc::new(error);
        let (rejectors, observers) = {
            let mut inner = self.lock();
            if !matches!(inner.slot, Slot::Pending) {
                return false;
            }
            inner.slot = Slot::Rejected(Arc::clone(&error));
            inner.delivering = true;
            inner.resolvers.clear();
            (
                mem::take(&mut inner.rejectors),
                mem::take(&mut inner.observers),
            )
        };

        let delivery = Delivery(self);
        for reject in rejectors {
            reject(&error);
        }
        for observe in observers {
            observe(Err(&error));
        }
        delivery.finish();
        true
    }

    /// Attach a continuation for the resolved value.
    ///
    /// Queued while pending; runs immediately if already resolved; silently
    /// discarded if rejected. Fails once the promise is finalized.
    pub fn on_resolve<F>(&self, continuation: F) -> Result<&Self, SettleError>
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let value = {
            let mut inner = self.lock();
            if inner.finalized {
                return Err(SettleError::InvalidState {
                    operation: "on_resolve",
                });
            }
            match inner.outcome() {
                None => {
                    inner.resolvers.push(Box::new(continuation));
                    return Ok(self);
                }
                Some(Ok(value)) => value,
                Some(Err(_)) => return Ok(self),
            }
        };

        continuation(&value);
        Ok(self)
    }

    /// Attach a continuation for the rejection error.
    ///
    /// Queued while pending; runs immediately if already rejected; silently
    /// discarded if resolved. Fails once the promise is finalized.
    pub fn on_reject<F>(&self, continuation: F) -> Result<&Self, SettleError>
    where
        F: FnOnce(&E) + Send + 'static,
    {
        let error = {
            let mut inner = self.lock();
            if inner.finalized {
                return Err(SettleError::InvalidState {
                    operation: "on_reject",
                });
            }
            match inner.outcome() {
                None => {
                    inner.rejectors.push(Box::new(continuation));
                    return Ok(self);
                }
                Some(Err(error)) => error,
                Some(Ok(_)) => return Ok(self),
            }
        };

        continuation(&error);
        Ok(self)
    }

    /// Attach a finalize continuation.
    ///
    /// While pending, or while the settling thread is still running resolve
    /// or reject continuations, it is queued. Once settled, attaching
    /// finalizes the promise: every queued finalizer runs once, in
    /// registration order, followed by this one. After finalization it simply
    /// runs.
    pub fn on_finally<F>(&self, continuation: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        let finalizers = {
            let mut inner = self.lock();
            if inner.delivering {
                inner.finalizers.push(Box::new(continuation));
                return self;
            }
            match inner.state() {
                State::Pending => {
                    inner.finalizers.push(Box::new(continuation));
                    return self;
                }
                State::Finalized => {
                    drop(inner);
                    continuation();
                    return self;
                }
                State::Resolved | State::Rejected => {
                    inner.finalized = true;
                    let mut finalizers = mem::take(&mut inner.finalizers);
                    finalizers.push(Box::new(continuation));
                    finalizers
                }
            }
        };

        for finalize in finalizers {
            finalize();
        }
        self
    }

    /// Observe the outcome, whichever way it goes.
    ///
    /// Unlike [`on_resolve`](Self::on_resolve) this is allowed after
    /// finalization; the stored outcome is replayed.
    pub fn on_settled<F>(&self, continuation: F) -> &Self
    where
        F: FnOnce(Result<&T, &E>) + Send + 'static,
    {
        let outcome = {
            let mut inner = self.lock();
            match inner.outcome() {
                None => {
                    inner.observers.push(Box::new(continuation));
                    return self;
                }
                Some(outcome) => outcome,
            }
        };

        match outcome {
            Ok(value) => continuation(Ok(&value)),
            Err(error) => continuation(Err(&error)),
        }
        self
    }

    /// Chain a new promise settled from this one's outcome.
    pub fn then<U, E2, F>(&self, transform: F) -> Promise<U, E2>
    where
        U: Send + Sync + 'static,
        E2: Send + Sync + 'static,
        F: FnOnce(Result<&T, &E>) -> Result<U, E2> + Send + 'static,
    {
        let next = Promise::new();
        let target = next.clone();
        self.on_settled(move |outcome| match transform(outcome) {
            Ok(value) => {
                target.resolve(value);
            }
            Err(error) => {
                target.reject(error);
            }
        });
        next
    }

    /// Chain a promise whose value is `f` applied to this one's value.
    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Send + Sync + 'static,
        E: Clone,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        self.then(move |outcome| match outcome {
            Ok(value) => Ok(f(value)),
            Err(error) => Err(error.clone()),
        })
    }

    /// Chain a promise whose error is `f` applied to this one's error.
    pub fn map_err<E2, F>(&self, f: F) -> Promise<T, E2>
    where
        T: Clone,
        E2: Send + Sync + 'static,
        F: FnOnce(&E) -> E2 + Send + 'static,
    {
        self.then(move |outcome| match outcome {
            Ok(value) => Ok(value.clone()),
            Err(error) => Err(f(error)),
        })
    }

    /// The outcome if settled, without waiting.
    pub fn try_outcome(&self) -> Option<Result<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        self.lock().outcome().map(|outcome| match outcome {
            Ok(value) => Ok(T::clone(&value)),
            Err(error) => Err(E::clone(&error)),
        })
    }

    /// Block the current thread until settled or `timeout` elapses.
    ///
    /// Returns `None` on timeout. Intended for hosts without an async
    /// runtime; the messaging core itself never blocks.
    pub fn wait(&self, timeout: Duration) -> Option<Result<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.on_settled(move |outcome| {
            let _ = tx.send(outcome.map(T::clone).map_err(E::clone));
        });
        rx.recv_timeout(timeout).ok()
    }

    /// Await the outcome from async code.
    ///
    /// Resolves to `Err(SettleError::Abandoned)` only if the continuation was
    /// dropped without running, which cannot happen while `self` is alive
    /// unless the promise is never settled and torn down elsewhere.
    #[cfg(feature = "async")]
    pub async fn settled(&self) -> Result<Result<T, E>, SettleError>
    where
        T: Clone,
        E: Clone,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.on_settled(move |outcome| {
            let _ = tx.send(outcome.map(T::clone).map_err(E::clone));
        });
        rx.await.map_err(|_| SettleError::Abandoned)
    }

    /// End the delivery phase and apply the finalize rule.
    fn run_pending_finalizers(&self) {
        let finalizers = {
            let mut inner = self.lock();
            inner.delivering = false;
            if inner.finalizers.is_empty() || matches!(inner.slot, Slot::Pending) {
                return;
            }
            inner.finalized = true;
            mem::take(&mut inner.finalizers)
        };

        for finalize in finalizers {
            finalize();
        }
    }
}

/// Marks the delivery phase of one settlement. A continuation that panics
/// still ends the phase, leaving queued finalizers to the next `on_finally`.
struct Delivery<'a, T, E>(&'a Promise<T, E>);

impl<T, E> Delivery<'_, T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn finish(self) {
        self.0.run_pending_finalizers();
    }
}

impl<T, E> Drop for Delivery<'_, T, E> {
    fn drop(&mut self) {
        self.0
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .delivering = false;
    }
}
