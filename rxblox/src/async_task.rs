//! Async / task wrapper (C7, §4.3).
//!
//! A computed signal whose compute function resolves asynchronously. Models
//! "stale-while-revalidate": the previous value stays readable as `loading`
//! flips to `true`, and a resolution whose version token is no longer
//! current is discarded — this is also how scenario 4 ("Async cancel") is
//! satisfied, since superseding a computation drops its future outright
//! (stronger than a token check alone, and the idiomatic Rust way to get
//! the same "stale resolution never lands" guarantee via RAII).
//!
//! There is no async executor in the teacher's dependency stack (or
//! anywhere else in the pack) that fits a single-threaded, `Rc`-based
//! signal graph, so polling is modeled the same way `debounce`/`throttle`
//! model timers in `scheduler.rs`: a host pumps pending tasks from its own
//! event loop via [`pump`], analogous to `leptos_reactive`'s `any_spawner`
//! abstraction (cited in the pack as the closest precedent for "someone
//! else drives the executor").

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use rxblox_runtime::SignalId;

use crate::devtools::{self, DevtoolsEvent};
use crate::error::AsyncError;
use crate::options::SignalOptions;
use crate::scope::{self, Disposable};
use crate::subscription::{self, Subscription};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// Cooperative cancellation signal handed to a compute closure. Checking it
/// is optional — superseding always drops the previous future regardless —
/// but I/O-bound compute functions with multiple await points can check it
/// to bail out earlier than their next poll would anyway.
#[derive(Clone)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// A synchronous snapshot of an async signal's state, as exposed by
/// `task(seed)` (§4.3, §6).
#[derive(Clone)]
pub struct TaskView<T> {
    pub loading: bool,
    pub value: Option<T>,
    pub error: Option<AsyncError>,
    pub version: u64,
}

struct AsyncInner<T> {
    id: SignalId,
    name: String,
    compute: RefCell<Box<dyn Fn(CancelToken) -> BoxFuture<Result<T, AsyncError>>>>,
    token: Cell<u64>,
    cancel_flag: RefCell<Option<Rc<Cell<bool>>>>,
    loading: Cell<bool>,
    value: RefCell<Option<T>>,
    error: RefCell<Option<AsyncError>>,
    version: Cell<u64>,
    in_flight: RefCell<Option<(u64, BoxFuture<Result<T, AsyncError>>)>>,
    disposed: Cell<bool>,
}

/// A computed signal whose value is produced by an async computation.
pub struct AsyncComputed<T> {
    inner: Rc<AsyncInner<T>>,
}

impl<T> Clone for AsyncComputed<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Clone + 'static> AsyncComputed<T> {
    pub fn new(
        compute: impl Fn(CancelToken) -> BoxFuture<Result<T, AsyncError>> + 'static,
        seed: Option<T>,
    ) -> Self {
        Self::new_with(compute, seed, SignalOptions::new())
    }

    pub fn new_with(
        compute: impl Fn(CancelToken) -> BoxFuture<Result<T, AsyncError>> + 'static,
        seed: Option<T>,
        options: SignalOptions<T>,
    ) -> Self {
        let id = rxblox_runtime::register();
        let name = options.name.unwrap_or_else(|| format!("async-signal-{}", id.raw()));
        let inner = Rc::new(AsyncInner {
            id,
            name,
            compute: RefCell::new(Box::new(compute)),
            token: Cell::new(0),
            cancel_flag: RefCell::new(None),
            loading: Cell::new(false),
            value: RefCell::new(seed),
            error: RefCell::new(None),
            version: Cell::new(0),
            in_flight: RefCell::new(None),
            disposed: Cell::new(false),
        });
        rxblox_runtime::mark_stale_only(id);
        let weak = Rc::downgrade(&inner);
        rxblox_runtime::set_refresh_callback(
            id,
            Some(Rc::new(move || {
                weak.upgrade()
                    .map(|inner| {
                        if !inner.disposed.get() && rxblox_runtime::is_stale(inner.id) {
                            AsyncInner::start(&inner, false);
                            true
                        } else {
                            false
                        }
                    })
                    .unwrap_or(false)
            })),
        );
        devtools::emit(DevtoolsEvent::SignalCreated { id, name: Rc::from(inner.name.as_str()) });
        let handle = Self { inner };
        scope::register_with_current_owner(Rc::new(handle.clone()));
        handle
    }

    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    /// Reads a snapshot, tracking this signal as a dependency and starting
    /// the computation if it has never run or is stale.
    pub fn view(&self) -> TaskView<T> {
        if !self.inner.disposed.get() {
            rxblox_runtime::record_dependency(self.inner.id);
            if rxblox_runtime::is_stale(self.inner.id) {
                AsyncInner::start(&self.inner, false);
            }
        }
        self.peek_view()
    }

    /// Reads the snapshot without tracking or triggering a start.
    pub fn peek_view(&self) -> TaskView<T> {
        TaskView {
            loading: self.inner.loading.get(),
            value: self.inner.value.borrow().clone(),
            error: self.inner.error.borrow().clone(),
            version: self.inner.version.get(),
        }
    }

    /// Forces a new computation, superseding any in-flight one, regardless
    /// of staleness (§4.1: "for async nodes, cancels any in-flight work").
    pub fn refresh(&self) {
        AsyncInner::start(&self.inner, true);
    }

    pub fn stale(&self) {
        rxblox_runtime::mark_stale_only(self.inner.id);
    }

    pub fn on(&self, listener: impl FnMut() + 'static) -> Subscription {
        subscription::attach(self.inner.id, listener)
    }

    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        if let Some(flag) = self.inner.cancel_flag.borrow_mut().take() {
            flag.set(true);
        }
        *self.inner.in_flight.borrow_mut() = None;
        rxblox_runtime::dispose(self.inner.id);
        devtools::emit(DevtoolsEvent::SignalDisposed {
            id: self.inner.id,
            name: Rc::from(self.inner.name.as_str()),
        });
    }
}

impl<T: Clone + 'static> AsyncInner<T> {
    fn start(inner: &Rc<Self>, force: bool) {
        if inner.disposed.get() {
            return;
        }
        if !force && !rxblox_runtime::is_stale(inner.id) {
            return;
        }
        if let Some(old_flag) = inner.cancel_flag.borrow_mut().take() {
            old_flag.set(true);
        }
        rxblox_runtime::clear_stale(inner.id);

        let new_token = inner.token.get() + 1;
        inner.token.set(new_token);
        inner.loading.set(true);
        let flag = Rc::new(Cell::new(false));
        *inner.cancel_flag.borrow_mut() = Some(flag.clone());

        let old_version = inner.version.get();
        let new_version = old_version + 1;
        inner.version.set(new_version);
        devtools::emit(DevtoolsEvent::SignalChanged {
            id: inner.id,
            name: Rc::from(inner.name.as_str()),
            old_version,
            new_version,
        });
        rxblox_runtime::mark_dirty(inner.id);

        let future = rxblox_runtime::track_compute(inner.id, || {
            (inner.compute.borrow())(CancelToken(flag))
        });
        *inner.in_flight.borrow_mut() = Some((new_token, future));
        task_registry::register(inner.clone());
    }

    /// Polls the in-flight future once, if any, and applies its result when
    /// it's ready and still current. No-op if nothing is in flight.
    fn poll_pending(&self) {
        let mut slot = self.in_flight.borrow_mut();
        let Some((token, future)) = slot.as_mut() else {
            return;
        };
        let token = *token;
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let poll_result = future.as_mut().poll(&mut cx);
        let Poll::Ready(result) = poll_result else {
            return;
        };
        *slot = None;
        drop(slot);

        if self.disposed.get() || token != self.token.get() {
            return; // superseded or disposed while in flight; discard (P7)
        }
        match result {
            Ok(value) => {
                *self.value.borrow_mut() = Some(value);
                *self.error.borrow_mut() = None;
            }
            Err(error) => {
                *self.error.borrow_mut() = Some(error);
            }
        }
        self.loading.set(false);
        let old_version = self.version.get();
        let new_version = old_version + 1;
        self.version.set(new_version);
        devtools::emit(DevtoolsEvent::SignalChanged {
            id: self.id,
            name: Rc::from(self.name.as_str()),
            old_version,
            new_version,
        });
        rxblox_runtime::mark_dirty(self.id);
    }

    fn is_finished(&self) -> bool {
        self.in_flight.borrow().is_none()
    }
}

impl<T: 'static> Disposable for AsyncComputed<T> {
    fn dispose(&self) {
        AsyncComputed::dispose(self);
    }
}

mod task_registry {
    use super::*;

    trait ErasedTask {
        fn poll(&self);
        fn finished(&self) -> bool;
    }

    impl<T: Clone + 'static> ErasedTask for AsyncInner<T> {
        fn poll(&self) {
            AsyncInner::poll_pending(self);
        }
        fn finished(&self) -> bool {
            AsyncInner::is_finished(self)
        }
    }

    thread_local! {
        static TASKS: RefCell<Vec<Rc<dyn ErasedTask>>> = RefCell::new(Vec::new());
    }

    pub(super) fn register<T: Clone + 'static>(task: Rc<AsyncInner<T>>) {
        TASKS.with(|tasks| tasks.borrow_mut().push(task as Rc<dyn ErasedTask>));
    }

    /// Polls every pending async computation once. The host calls this from
    /// its own event loop (or a test calls it directly) to advance
    /// in-flight computations; finished entries are pruned.
    pub fn pump() {
        TASKS.with(|tasks| {
            for task in tasks.borrow().iter() {
                task.poll();
            }
            tasks.borrow_mut().retain(|task| !task.finished());
        });
    }
}

pub use task_registry::pump;

fn noop_raw_waker() -> RawWaker {
    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
    RawWaker::new(std::ptr::null(), &VTABLE)
}

fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future;

    #[test]
    fn resolves_and_bumps_version() {
        let task: AsyncComputed<i32> = AsyncComputed::new(|_token| Box::pin(async { Ok(7) }), None);
        let before = task.view();
        assert!(before.loading);
        pump();
        let after = task.peek_view();
        assert!(!after.loading);
        assert_eq!(after.value, Some(7));
    }

    #[test]
    fn superseded_resolution_is_discarded() {
        let responses = Rc::new(RefCell::new(vec!["b".to_string(), "a".to_string()]));
        let r = responses.clone();
        let task: AsyncComputed<String> = AsyncComputed::new(
            move |_token| {
                let next = r.borrow_mut().pop().unwrap_or_default();
                Box::pin(async move { Ok(next) })
            },
            None,
        );
        task.view(); // starts, popping "a"
        task.refresh(); // starts again, popping "b", supersedes the first
        pump();
        let view = task.peek_view();
        assert_eq!(view.value, Some("b".to_string()));
    }

    #[test]
    fn pending_future_reported_while_not_ready() {
        let task: AsyncComputed<i32> = AsyncComputed::new(|_token| Box::pin(future::pending()), None);
        task.view();
        pump();
        assert!(task.peek_view().loading);
    }
}
