//! The dependency graph and propagation engine backing `rxblox`.
//!
//! This crate knows nothing about signal *values* — only about `SignalId`s,
//! the edges between them, and when a batch of accepted mutations has
//! settled enough to fire listeners. The value storage, equality policy, and
//! compute functions all live one layer up, in `rxblox`.
//!
//! The whole engine is a single `thread_local!` instance (mirroring
//! `repose-core`'s `reactive.rs` `CURRENT_OBSERVER`/`GRAPH` pattern): there is
//! no parallelism inside the core (see the crate-level docs of `rxblox` for
//! why), so a plain `RefCell`-guarded module stack is sufficient and avoids
//! the atomics/locking the teacher's `Send + Sync` runtime axis pays for.

mod graph;
mod stale;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use graph::ListenerId;
use graph::{Graph, NodeEntry};

/// Opaque identity of a node in the dependency graph.
///
/// Ids are never reused within a process, per I1/I2 in the core spec: once
/// issued, an id stays meaningful (even after the signal that owned it is
/// disposed) so that stale references can't accidentally alias a new signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl SignalId {
    fn fresh() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value, exposed for auto-generated display names.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Return value of a recompute/refresh callback, mirroring the teacher's
/// `isoprenoid::runtime::Update` / `Propagation` enums.
///
/// `Propagate` tells the engine that dependents should continue to be
/// considered stale (and, if listened to, refreshed in turn); `Halt` stops
/// the walk here — used when equality suppressed an actual change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "the engine only propagates staleness when told to"]
pub enum Propagation {
    Propagate,
    Halt,
}

const MAX_REENTRANT_ROUNDS: u32 = 1_000;

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
    /// Set once by the layer above (which knows signal names) to forward a
    /// caught listener panic into its own event ring. `None` until installed.
    static LISTENER_PANIC_HOOK: RefCell<Option<Rc<dyn Fn(SignalId, Box<dyn Any + Send>)>>> =
        RefCell::new(None);
    /// Set once by the layer above to observe that a batch settled and how
    /// many listened-to signals actually changed.
    static BATCH_COMMITTED_HOOK: RefCell<Option<Rc<dyn Fn(usize)>>> = RefCell::new(None);
}

/// Registers the callback invoked (instead of propagating the unwind) when a
/// listener panics during `flush()`, per §4.2 step 4 / §7's `Listener` row:
/// caught, reported, and the batch keeps settling. Replaces any previously
/// registered hook.
pub fn set_listener_panic_hook(hook: impl Fn(SignalId, Box<dyn Any + Send>) + 'static) {
    LISTENER_PANIC_HOOK.with(|h| *h.borrow_mut() = Some(Rc::new(hook)));
}

/// Registers the callback invoked once per settled batch with the number of
/// listened-to signals whose value actually changed. Replaces any previously
/// registered hook.
pub fn set_batch_committed_hook(hook: impl Fn(usize) + 'static) {
    BATCH_COMMITTED_HOOK.with(|h| *h.borrow_mut() = Some(Rc::new(hook)));
}

struct Runtime {
    graph: RefCell<Graph>,
    /// Frames of the ambient tracking stack. `None` marks an `untrack`/detached frame.
    stack: RefCell<Vec<Option<SignalId>>>,
    /// Depth of (possibly nested) `batch()` calls.
    batch_depth: Cell<u32>,
    /// Whether we are currently inside `flush()`.
    flushing: Cell<bool>,
    /// Mutations accepted for the batch currently being assembled.
    pending_dirty: RefCell<Vec<SignalId>>,
    /// Mutations that arrived while `flushing` was true; become next round's `pending_dirty`.
    next_pass_dirty: RefCell<Vec<SignalId>>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            graph: RefCell::new(Graph::default()),
            stack: RefCell::new(Vec::new()),
            batch_depth: Cell::new(0),
            flushing: Cell::new(false),
            pending_dirty: RefCell::new(Vec::new()),
            next_pass_dirty: RefCell::new(Vec::new()),
        }
    }
}

/// Allocates a fresh, process-unique [`SignalId`] and registers it with the graph.
pub fn register() -> SignalId {
    let id = SignalId::fresh();
    RUNTIME.with(|rt| rt.graph.borrow_mut().insert(id));
    id
}

/// Records `dep` as a dependency of whatever is on top of the ambient tracking
/// stack, if anything. No-op outside of a tracking frame (plain top-level reads).
///
/// # Panics
///
/// Panics with a `Cycle` message if `dep` is already being computed higher up
/// the current thread's stack (I1: a compute function observing itself
/// transitively must raise a cycle error).
pub fn record_dependency(dep: SignalId) {
    RUNTIME.with(|rt| {
        let stack = rt.stack.borrow();
        let Some(&Some(reader)) = stack.last() else {
            return;
        };
        if reader == dep || stack.iter().any(|frame| *frame == Some(dep)) {
            drop(stack);
            panic!(
                "rxblox: cycle detected — signal {dep:?} was read while already \
                 computing on the same thread"
            );
        }
        drop(stack);
        rt.graph.borrow_mut().record_touch(reader, dep);
    });
}

/// Runs `f` as the recompute body of `id`, returning `f`'s result and whether
/// the set of signals it read changed from the previous recompute.
///
/// Wires/unwires dependent edges for any dependency that was added or removed
/// (§4.1 step 4 of the core spec).
pub fn track_compute<T>(id: SignalId, f: impl FnOnce() -> T) -> T {
    RUNTIME.with(|rt| {
        rt.stack.borrow_mut().push(Some(id));
    });
    let result = f();
    RUNTIME.with(|rt| {
        let popped = rt.stack.borrow_mut().pop();
        debug_assert_eq!(popped, Some(Some(id)));
        rt.graph.borrow_mut().commit_touches(id);
    });
    result
}

/// Runs `f` outside of any ambient tracking frame: reads inside `f` are not
/// recorded as dependencies of an outer compute.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    RUNTIME.with(|rt| rt.stack.borrow_mut().push(None));
    let result = f();
    RUNTIME.with(|rt| {
        let popped = rt.stack.borrow_mut().pop();
        debug_assert_eq!(popped, Some(None));
    });
    result
}

/// Whether `id` is currently marked stale by the engine.
pub fn is_stale(id: SignalId) -> bool {
    RUNTIME.with(|rt| rt.graph.borrow().is_stale(id))
}

/// Clears the stale flag for `id`. Called by a computed/async signal after it
/// has finished recomputing.
pub fn clear_stale(id: SignalId) {
    RUNTIME.with(|rt| rt.graph.borrow_mut().clear_stale(id));
}

/// Registers the callback the engine calls during batch flush to eagerly
/// bring a listened-to node back in sync, in case it (or a listened
/// descendant) is stale. Returns `true` iff the node's value actually
/// changed (used to decide whether to fire that node's own listeners).
///
/// Only computed/async signals have one of these; mutable signals and
/// notifiers are never stale, so they pass `None`.
pub fn set_refresh_callback(id: SignalId, refresh: Option<Rc<dyn Fn() -> bool>>) {
    RUNTIME.with(|rt| rt.graph.borrow_mut().set_refresh(id, refresh));
}

/// Attaches a listener to `id`. Returns a token usable with [`remove_listener`].
pub fn add_listener(id: SignalId, listener: Rc<dyn Fn()>) -> ListenerId {
    RUNTIME.with(|rt| rt.graph.borrow_mut().add_listener(id, listener))
}

/// Detaches a previously-added listener. Idempotent if already removed (e.g.
/// because `id` was disposed in the meantime).
pub fn remove_listener(id: SignalId, token: ListenerId) {
    RUNTIME.with(|rt| rt.graph.borrow_mut().remove_listener(id, token));
}

/// Disposes `id`: detaches it from every dependency/dependent edge, drops its
/// listeners and refresh callback. Idempotent.
pub fn dispose(id: SignalId) {
    RUNTIME.with(|rt| rt.graph.borrow_mut().dispose(id));
}

/// Marks a computed signal stale without going through the batch/listener
/// machinery (used by the `stale()` operator / API, §4.1).
pub fn mark_stale_only(id: SignalId) {
    RUNTIME.with(|rt| rt.graph.borrow_mut().force_stale(id));
}

/// Returns the set of signals `id` currently depends on (for diagnostics/tests).
pub fn dependencies_of(id: SignalId) -> HashSet<SignalId> {
    RUNTIME.with(|rt| rt.graph.borrow().deps_of(id))
}

/// Accepts a mutation of `id` into the currently-open batch (opening an
/// implicit one-mutation batch if none is open), per §4.2.
pub fn mark_dirty(id: SignalId) {
    let should_flush = RUNTIME.with(|rt| {
        if rt.flushing.get() {
            rt.next_pass_dirty.borrow_mut().push(id);
            false
        } else {
            rt.pending_dirty.borrow_mut().push(id);
            rt.batch_depth.get() == 0
        }
    });
    if should_flush {
        run_flush_loop();
    }
}

/// Runs `f`, coalescing any mutations performed within it (directly or via
/// nested `batch()` calls) into a single propagation pass that happens after
/// `f` returns (§4.2: "Nested batches: inner mutations join the outer batch").
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    RUNTIME.with(|rt| rt.batch_depth.set(rt.batch_depth.get() + 1));
    let result = f();
    let now_zero = RUNTIME.with(|rt| {
        let depth = rt.batch_depth.get() - 1;
        rt.batch_depth.set(depth);
        depth == 0
    });
    if now_zero {
        run_flush_loop();
    }
    result
}

/// Runs `f` exempted from dependency recording and from the current batch's
/// subscription bookkeeping, mirroring `SignalRuntimeRef::run_detached`.
pub fn run_detached<T>(f: impl FnOnce() -> T) -> T {
    untrack(f)
}

fn run_flush_loop() {
    let mut rounds = 0u32;
    loop {
        let dirty = RUNTIME.with(|rt| std::mem::take(&mut *rt.pending_dirty.borrow_mut()));
        if dirty.is_empty() {
            break;
        }
        RUNTIME.with(|rt| rt.flushing.set(true));
        flush(dirty);
        RUNTIME.with(|rt| {
            rt.flushing.set(false);
            let next = std::mem::take(&mut *rt.next_pass_dirty.borrow_mut());
            *rt.pending_dirty.borrow_mut() = next;
        });
        rounds += 1;
        if rounds > MAX_REENTRANT_ROUNDS {
            panic!(
                "rxblox: exceeded {MAX_REENTRANT_ROUNDS} re-entrant batch rounds; \
                 a listener is likely writing back to one of its own (transitive) \
                 dependencies every time it runs"
            );
        }
    }
}

/// The actual §4.2 propagation pass for one settled batch.
fn flush(dirty: Vec<SignalId>) {
    #[cfg(feature = "trace")]
    tracing::trace!(roots = dirty.len(), "flush: starting batch");

    let order = RUNTIME.with(|rt| rt.graph.borrow_mut().mark_stale_transitively(&dirty));
    let dirty_set: HashSet<SignalId> = dirty.iter().copied().collect();

    #[cfg(feature = "trace")]
    tracing::trace!(reachable = order.len(), "flush: staleness propagated");

    let mut changed_count = 0usize;
    for id in order {
        let (listeners, refresh) =
            RUNTIME.with(|rt| rt.graph.borrow().listeners_and_refresh(id));
        if listeners.is_empty() {
            continue;
        }
        let changed = if dirty_set.contains(&id) {
            true
        } else if let Some(refresh) = refresh {
            refresh()
        } else {
            true
        };
        if !changed {
            continue;
        }
        changed_count += 1;
        for listener in listeners {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener())) {
                let hook = LISTENER_PANIC_HOOK.with(|h| h.borrow().clone());
                if let Some(hook) = hook {
                    hook(id, payload);
                }
            }
        }
    }

    let hook = BATCH_COMMITTED_HOOK.with(|h| h.borrow().clone());
    if let Some(hook) = hook {
        hook(changed_count);
    }
}
