//! Signal cell (C5, §4.1): mutable, computed, and notifier variants.
//!
//! Grounded on `flourish::subject::Subject` (the mutable cell) and
//! `flourish`'s `raw::computed` shape for the lazy-recompute algorithm, but
//! implemented with plain `Rc<RefCell<_>>` rather than the teacher's atomic
//! `Strong`/`Weak` refcounting — see `DESIGN.md` for why the single-threaded
//! axis is sufficient here.

use std::cell::{Cell, RefCell};
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use rxblox_runtime::SignalId;

use crate::devtools::{self, DevtoolsEvent};
use crate::equality::Equality;
use crate::error::{self, ComputeError};
use crate::options::SignalOptions;
use crate::scope::{self, Disposable};
use crate::subscription::{self, Subscription};
use crate::tag::TagMember;

fn auto_name(id: SignalId) -> String {
    format!("signal-{}", id.raw())
}

/// Minimal surface a host renderer needs (C12): read-and-track, subscribe,
/// dispose. Implemented by every concrete signal kind so UI glue can hold a
/// `Box<dyn DynSignal<T>>` without caring whether it's mutable, computed, or
/// an async signal's `task()` view.
pub trait DynSignal<T> {
    fn get(&self) -> T;
    fn peek(&self) -> T;
    fn on(&self, listener: Box<dyn FnMut()>) -> Subscription;
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

// ---------------------------------------------------------------------
// Mutable / Notifier
// ---------------------------------------------------------------------

struct MutableInner<T> {
    id: SignalId,
    name: String,
    value: RefCell<T>,
    initial: RefCell<T>,
    version: Cell<u64>,
    equals: Equality<T>,
    on_change: Option<Rc<dyn Fn(&T)>>,
    is_notifier: bool,
    disposed: Cell<bool>,
}

/// A mutable signal cell. Cloning is cheap (an `Rc` bump) and yields another
/// handle to the same cell, mirroring `flourish::Subject`'s clone semantics.
pub struct Mutable<T> {
    inner: Rc<MutableInner<T>>,
}

impl<T> Clone for Mutable<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Clone + PartialEq + 'static> Mutable<T> {
    pub fn new(initial: T) -> Self {
        Self::new_with(initial, SignalOptions::new())
    }

    pub fn new_with(initial: T, options: SignalOptions<T>) -> Self {
        Self::construct(initial, options, false)
    }

    fn construct(initial: T, options: SignalOptions<T>, is_notifier: bool) -> Self {
        let id = rxblox_runtime::register();
        let name = options.name.unwrap_or_else(|| auto_name(id));
        let reset_target = options.initial_value.unwrap_or_else(|| initial.clone());
        let inner = Rc::new(MutableInner {
            id,
            name,
            value: RefCell::new(initial),
            initial: RefCell::new(reset_target),
            version: Cell::new(0),
            equals: options.equals,
            on_change: options.on_change,
            is_notifier,
            disposed: Cell::new(false),
        });
        for tag in &options.tags {
            tag.add(&(inner.clone() as Rc<dyn TagMember<T>>));
        }
        devtools::emit(DevtoolsEvent::SignalCreated {
            id,
            name: Rc::from(inner.name.as_str()),
        });
        let handle = Self { inner };
        scope::register_with_current_owner(Rc::new(handle.clone()));
        handle
    }

    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Reads the value and, if inside a tracking frame, registers this
    /// signal as a dependency of whatever is computing.
    pub fn get(&self) -> T {
        if !self.inner.disposed.get() {
            rxblox_runtime::record_dependency(self.inner.id);
        }
        self.peek()
    }

    /// Reads the value without tracking (§4.1: "read without tracking").
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    pub fn set(&self, value: T) {
        self.set_impl(value);
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = {
            let current = self.inner.value.borrow();
            f(&current)
        };
        self.set_impl(next);
    }

    fn set_impl(&self, value: T) {
        if self.inner.disposed.get() {
            error::panic_disposed(&self.inner.name);
        }
        let changed = self.inner.is_notifier || {
            let current = self.inner.value.borrow();
            !self.inner.equals.eq(&current, &value)
        };
        if !changed {
            return;
        }
        *self.inner.value.borrow_mut() = value;
        let old_version = self.inner.version.get();
        let new_version = old_version + 1;
        self.inner.version.set(new_version);
        if let Some(on_change) = &self.inner.on_change {
            on_change(&self.inner.value.borrow());
        }
        devtools::emit(DevtoolsEvent::SignalChanged {
            id: self.inner.id,
            name: Rc::from(self.inner.name.as_str()),
            old_version,
            new_version,
        });
        rxblox_runtime::mark_dirty(self.inner.id);
    }

    /// Mutable-only: restores the value the signal was constructed with.
    pub fn reset(&self) {
        let initial = self.inner.initial.borrow().clone();
        self.set(initial);
    }

    pub fn on(&self, listener: impl FnMut() + 'static) -> Subscription {
        subscription::attach(self.inner.id, listener)
    }

    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        rxblox_runtime::dispose(self.inner.id);
        devtools::emit(DevtoolsEvent::SignalDisposed {
            id: self.inner.id,
            name: Rc::from(self.inner.name.as_str()),
        });
    }
}

impl<T: Clone + PartialEq + 'static> TagMember<T> for MutableInner<T> {
    fn id(&self) -> SignalId {
        self.id
    }

    fn peek(&self) -> T {
        self.value.borrow().clone()
    }
}

impl<T: Clone + PartialEq + 'static> Disposable for Mutable<T> {
    fn dispose(&self) {
        Mutable::dispose(self);
    }
}

impl<T: Clone + PartialEq + 'static> DynSignal<T> for Mutable<T> {
    fn get(&self) -> T {
        Mutable::get(self)
    }
    fn peek(&self) -> T {
        Mutable::peek(self)
    }
    fn on(&self, mut listener: Box<dyn FnMut()>) -> Subscription {
        Mutable::on(self, move || listener())
    }
    fn dispose(&self) {
        Mutable::dispose(self)
    }
    fn is_disposed(&self) -> bool {
        Mutable::is_disposed(self)
    }
}

/// A mutable signal with no meaningful value: every `notify()` — even with
/// a logically identical payload — bumps the version and fires listeners
/// (§3: "Notifier signal"). Used for event/action buses and refresh triggers.
pub struct Notifier {
    inner: Mutable<()>,
}

impl Clone for Notifier {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::new_with(SignalOptions::new())
    }

    pub fn new_with(mut options: SignalOptions<()>) -> Self {
        options.equals = Equality::Strict;
        Self { inner: Mutable::construct((), options, true) }
    }

    pub fn notify(&self) {
        self.inner.set(());
    }

    pub fn on(&self, listener: impl FnMut() + 'static) -> Subscription {
        self.inner.on(listener)
    }

    pub fn id(&self) -> SignalId {
        self.inner.id()
    }

    pub fn version(&self) -> u64 {
        self.inner.version()
    }

    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for Notifier {
    fn dispose(&self) {
        Notifier::dispose(self);
    }
}

// ---------------------------------------------------------------------
// Computed
// ---------------------------------------------------------------------

struct ComputedInner<T> {
    id: SignalId,
    name: String,
    compute: RefCell<Box<dyn Fn() -> T>>,
    cached: RefCell<Option<Result<T, ComputeError>>>,
    version: Cell<u64>,
    equals: Equality<T>,
    disposed: Cell<bool>,
}

/// A read-only signal whose value is derived from others (§4.1's
/// "Computed recomputation algorithm"). Lazily evaluated: the compute
/// function does not run until the first `get`/`peek` after construction,
/// and not again until something it read changes *and* it is read again.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self::new_with(compute, SignalOptions::new())
    }

    pub fn new_with(compute: impl Fn() -> T + 'static, options: SignalOptions<T>) -> Self {
        let id = rxblox_runtime::register();
        let name = options.name.unwrap_or_else(|| auto_name(id));
        let inner = Rc::new(ComputedInner {
            id,
            name,
            compute: RefCell::new(Box::new(compute)),
            cached: RefCell::new(None),
            version: Cell::new(0),
            equals: options.equals,
            disposed: Cell::new(false),
        });
        for tag in &options.tags {
            tag.add(&(inner.clone() as Rc<dyn TagMember<T>>));
        }
        rxblox_runtime::mark_stale_only(id);
        let weak = Rc::downgrade(&inner);
        rxblox_runtime::set_refresh_callback(
            id,
            Some(Rc::new(move || {
                weak.upgrade().map(|inner| ComputedInner::recompute(&inner, false)).unwrap_or(false)
            })),
        );
        devtools::emit(DevtoolsEvent::SignalCreated {
            id,
            name: Rc::from(inner.name.as_str()),
        });
        let handle = Self { inner };
        scope::register_with_current_owner(Rc::new(handle.clone()));
        handle
    }

    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn get(&self) -> T {
        if !self.inner.disposed.get() {
            rxblox_runtime::record_dependency(self.inner.id);
        }
        self.peek()
    }

    pub fn peek(&self) -> T {
        match self.try_peek() {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }

    /// Like `peek`, but surfaces a compute error as `Err` instead of
    /// panicking — for UI glue that wants to render an error state (§7).
    pub fn try_peek(&self) -> Result<T, ComputeError> {
        ComputedInner::recompute(&self.inner, false);
        self.inner
            .cached
            .borrow()
            .clone()
            .expect("computed signal has no cached value after a recompute attempt")
    }

    /// Marks this computed stale without recomputing or notifying listeners
    /// (used by the `staleOn` operator).
    pub fn stale(&self) {
        rxblox_runtime::mark_stale_only(self.inner.id);
    }

    /// Forces an immediate recompute and notifies listeners regardless of
    /// whether the result compares equal to the cached value (used by the
    /// `refreshOn` operator). See `DESIGN.md`'s Open Question #1.
    pub fn refresh(&self) {
        ComputedInner::recompute(&self.inner, true);
        rxblox_runtime::mark_dirty(self.inner.id);
    }

    pub fn on(&self, listener: impl FnMut() + 'static) -> Subscription {
        subscription::attach(self.inner.id, listener)
    }

    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        rxblox_runtime::dispose(self.inner.id);
        devtools::emit(DevtoolsEvent::SignalDisposed {
            id: self.inner.id,
            name: Rc::from(self.inner.name.as_str()),
        });
    }
}

impl<T: Clone + PartialEq + 'static> ComputedInner<T> {
    /// Re-evaluates `compute` if stale (or unconditionally if `force`).
    /// Returns whether the cached value's version advanced.
    fn recompute(inner: &Rc<Self>, force: bool) -> bool {
        let already_computed = inner.cached.borrow().is_some();
        if inner.disposed.get() && already_computed {
            return false;
        }
        if !force && already_computed && !rxblox_runtime::is_stale(inner.id) {
            return false;
        }

        let compute_inner = inner.clone();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            rxblox_runtime::track_compute(compute_inner.id, || {
                (compute_inner.compute.borrow())()
            })
        }));
        rxblox_runtime::clear_stale(inner.id);

        let value_changed = match &result {
            Ok(value) => match &*inner.cached.borrow() {
                Some(Ok(prev)) => !inner.equals.eq(prev, value),
                _ => true,
            },
            Err(_) => true,
        };

        match result {
            Ok(value) => *inner.cached.borrow_mut() = Some(Ok(value)),
            Err(payload) => {
                *inner.cached.borrow_mut() = Some(Err(ComputeError::from_panic(payload)))
            }
        }

        let changed = force || value_changed;
        if changed {
            let old_version = inner.version.get();
            let new_version = old_version + 1;
            inner.version.set(new_version);
            devtools::emit(DevtoolsEvent::SignalChanged {
                id: inner.id,
                name: Rc::from(inner.name.as_str()),
                old_version,
                new_version,
            });
        }
        changed
    }
}

impl<T: Clone + PartialEq + 'static> TagMember<T> for ComputedInner<T> {
    fn id(&self) -> SignalId {
        self.id
    }

    fn peek(&self) -> T {
        match &*self.cached.borrow() {
            Some(Ok(value)) => value.clone(),
            _ => panic!("tag iteration reached an unevaluated or errored computed signal"),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Disposable for Computed<T> {
    fn dispose(&self) {
        Computed::dispose(self);
    }
}

impl<T: Clone + PartialEq + 'static> DynSignal<T> for Computed<T> {
    fn get(&self) -> T {
        Computed::get(self)
    }
    fn peek(&self) -> T {
        Computed::peek(self)
    }
    fn on(&self, mut listener: Box<dyn FnMut()>) -> Subscription {
        Computed::on(self, move || listener())
    }
    fn dispose(&self) {
        Computed::dispose(self)
    }
    fn is_disposed(&self) -> bool {
        Computed::is_disposed(self)
    }
}

enum WeakKind<T> {
    Mutable(std::rc::Weak<MutableInner<T>>),
    Computed(std::rc::Weak<ComputedInner<T>>),
}

/// A non-owning reference to a signal (§3: "Weak handles"). Holding a
/// `WeakSignal<T>` does not keep the signal — or its owning scope — alive;
/// it upgrades to a live, readable handle only while the signal still
/// exists. Mirrors `flourish::signal::Signal`'s own `Signal`/`Weak` split,
/// reused here across every concrete signal kind rather than a single one,
/// so UI bindings and caches can refer to a signal without participating in
/// its disposal.
pub struct WeakSignal<T> {
    kind: WeakKind<T>,
}

impl<T> Clone for WeakSignal<T> {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            WeakKind::Mutable(w) => WeakKind::Mutable(w.clone()),
            WeakKind::Computed(w) => WeakKind::Computed(w.clone()),
        };
        Self { kind }
    }
}

impl<T: Clone + PartialEq + 'static> WeakSignal<T> {
    /// Upgrades back to a live handle, or `None` if the signal has since
    /// been dropped (every strong `Mutable`/`Computed` clone gone, or its
    /// owning scope disposed it).
    pub fn upgrade(&self) -> Option<Box<dyn DynSignal<T>>> {
        match &self.kind {
            WeakKind::Mutable(weak) => {
                weak.upgrade().map(|inner| Box::new(Mutable { inner }) as Box<dyn DynSignal<T>>)
            }
            WeakKind::Computed(weak) => {
                weak.upgrade().map(|inner| Box::new(Computed { inner }) as Box<dyn DynSignal<T>>)
            }
        }
    }
}

impl<T> From<&Mutable<T>> for WeakSignal<T> {
    fn from(signal: &Mutable<T>) -> Self {
        Self { kind: WeakKind::Mutable(Rc::downgrade(&signal.inner)) }
    }
}

impl<T> From<&Computed<T>> for WeakSignal<T> {
    fn from(signal: &Computed<T>) -> Self {
        Self { kind: WeakKind::Computed(Rc::downgrade(&signal.inner)) }
    }
}

impl From<&Notifier> for WeakSignal<()> {
    fn from(signal: &Notifier) -> Self {
        WeakSignal::from(&signal.inner)
    }
}

/// Builds an aggregated computed signal from several signals read
/// positionally, per `signal.from([signal, …])` (§6).
pub fn from_all<T: Clone + PartialEq + 'static, S: Clone + PartialEq + 'static>(
    sources: Vec<Computed<S>>,
    combine: impl Fn(&[S]) -> T + 'static,
) -> Computed<T> {
    Computed::new(move || {
        let snapshot: Vec<S> = sources.iter().map(|s| s.get()).collect();
        combine(&snapshot)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn counter_scenario() {
        let c = Mutable::new(0);
        let c2 = c.clone();
        let double = Computed::new(move || c2.get() * 2);
        c.set(3);
        assert_eq!(double.get(), 6);
    }

    #[test]
    fn equality_short_circuit_skips_version_bump() {
        let s = Mutable::new(1);
        let before = s.version();
        s.set(1);
        assert_eq!(s.version(), before);
    }

    #[test]
    fn unsubscribe_stops_future_notifications() {
        let s = Mutable::new(0);
        let calls = Rc::new(StdRefCell::new(0));
        let calls2 = calls.clone();
        let sub = s.on(move || *calls2.borrow_mut() += 1);
        s.set(1);
        sub.unsubscribe();
        s.set(2);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn notifier_fires_on_every_notify() {
        let n = Notifier::new();
        let calls = Rc::new(StdRefCell::new(0));
        let calls2 = calls.clone();
        n.on(move || *calls2.borrow_mut() += 1);
        n.notify();
        n.notify();
        assert_eq!(*calls.borrow(), 2);
    }

    #[test]
    fn reset_restores_initial_value() {
        let s = Mutable::new(10);
        s.set(99);
        s.reset();
        assert_eq!(s.peek(), 10);
    }

    #[test]
    fn lazy_recompute_skips_uninvoked_compute() {
        let calls = Rc::new(StdRefCell::new(0));
        let a = Mutable::new(1);
        let calls2 = calls.clone();
        let a2 = a.clone();
        let c = Computed::new(move || {
            *calls2.borrow_mut() += 1;
            a2.get()
        });
        c.peek();
        a.set(2);
        assert_eq!(*calls.borrow(), 1); // not recomputed just because `a` changed
    }

    #[test]
    fn compute_panic_is_cached_and_rethrown() {
        let flag = Mutable::new(false);
        let flag2 = flag.clone();
        let c: Computed<i32> = Computed::new(move || {
            if flag2.get() {
                panic!("boom")
            } else {
                1
            }
        });
        assert_eq!(c.peek(), 1);
        flag.set(true);
        let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| c.peek()));
        assert!(err.is_err());
    }

    #[test]
    fn weak_signal_upgrades_while_alive_and_fails_once_dropped() {
        // A top-level `Mutable` is also kept alive by the implicit
        // process-scope (§4.6), so construct it under a throwaway `Scope`
        // whose disposal actually releases the last strong reference.
        let owning_scope = scope::Scope::new(None);
        let s = owning_scope.enter(|| Mutable::new(1));
        let weak = WeakSignal::from(&s);
        {
            // Scoped so the upgraded strong handle doesn't outlive `s` below.
            let upgraded = weak.upgrade().expect("signal is still alive");
            assert_eq!(upgraded.get(), 1);
        }
        s.set(2);
        assert_eq!(weak.upgrade().expect("still alive").peek(), 2);

        drop(s);
        owning_scope.dispose();
        assert!(weak.upgrade().is_none());
    }
}
