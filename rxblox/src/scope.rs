//! Disposal / scope model (C4, C11, §4.6).
//!
//! The runtime maintains an ambient *owner* stack. Every signal,
//! subscription, and effect registers itself with whatever [`Scope`] is on
//! top of the stack at construction time; disposing the owner disposes
//! everything registered with it, in reverse-registration order. Top-level
//! declarations — no scope entered — fall back to an implicit process-scope
//! that lives for the program's lifetime, matching §4.6's "implicit
//! process-scope" fallback.
//!
//! This mirrors `sycamore-reactive`'s scope/dispose-order conventions
//! (child scopes and effects torn down before a scope's own cleanups run),
//! adapted from its explicit `Scope<'a>` parameter style to the ambient,
//! no-parameter style this runtime's tracking context already uses (see
//! `rxblox-runtime`'s `thread_local!` stack).

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static OWNER_STACK: RefCell<Vec<Scope>> = const { RefCell::new(Vec::new()) };
    static ROOT_SCOPE: Scope = Scope::new_inner(Some("<process>".to_string()));
}

/// Anything a [`Scope`] can own and dispose of: signals, subscriptions,
/// effects, and nested scopes all implement this.
pub trait Disposable {
    fn dispose(&self);
}

struct ScopeInner {
    name: Option<String>,
    disposed: RefCell<bool>,
    disposing: RefCell<bool>,
    resources: RefCell<Vec<Rc<dyn Disposable>>>,
    on_dispose: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// A disposable lifetime container (§4.6's "disposable context").
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn new(name: impl Into<Option<String>>) -> Self {
        Self::new_inner(name.into())
    }

    fn new_inner(name: Option<String>) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                name,
                disposed: RefCell::new(false),
                disposing: RefCell::new(false),
                resources: RefCell::new(Vec::new()),
                on_dispose: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn is_disposed(&self) -> bool {
        *self.inner.disposed.borrow()
    }

    /// Registers `resource` to be disposed when this scope is disposed.
    /// Called by signal/effect/subscription constructors against the
    /// *current* owner — use [`register_with_current_owner`] for that.
    pub fn register(&self, resource: Rc<dyn Disposable>) {
        if self.is_disposed() {
            return;
        }
        self.inner.resources.borrow_mut().push(resource);
    }

    /// Registers a plain cleanup callback, run after all owned resources
    /// have been disposed (step 3 of §4.6's cleanup order).
    pub fn on_dispose(&self, cb: impl FnOnce() + 'static) {
        if self.is_disposed() {
            return;
        }
        self.inner.on_dispose.borrow_mut().push(Box::new(cb));
    }

    /// Pushes `self` as the current owner, runs `f`, pops. Anything
    /// constructed inside `f` (directly or transitively) registers with
    /// this scope.
    pub fn enter<T>(&self, f: impl FnOnce() -> T) -> T {
        OWNER_STACK.with(|stack| stack.borrow_mut().push(self.clone()));
        let result = f();
        OWNER_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
        result
    }

    /// Cleanup order (§4.6): mark disposing, dispose owned resources in
    /// reverse-registration order, run `on_dispose` callbacks, mark
    /// disposed. Idempotent.
    pub fn dispose(&self) {
        if *self.inner.disposing.borrow() || self.is_disposed() {
            return;
        }
        *self.inner.disposing.borrow_mut() = true;

        let resources = std::mem::take(&mut *self.inner.resources.borrow_mut());
        for resource in resources.into_iter().rev() {
            resource.dispose();
        }

        let callbacks = std::mem::take(&mut *self.inner.on_dispose.borrow_mut());
        for cb in callbacks {
            cb();
        }

        *self.inner.disposed.borrow_mut() = true;
        *self.inner.disposing.borrow_mut() = false;
    }
}

impl Disposable for Scope {
    fn dispose(&self) {
        Scope::dispose(self);
    }
}

/// The owner new resources should register with: the topmost entry of the
/// ambient stack, or the implicit process-scope if none is active.
pub fn current_owner() -> Scope {
    OWNER_STACK.with(|stack| stack.borrow().last().cloned()).unwrap_or_else(root_scope)
}

pub fn root_scope() -> Scope {
    ROOT_SCOPE.with(Clone::clone)
}

pub fn register_with_current_owner(resource: Rc<dyn Disposable>) {
    current_owner().register(resource);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter(Rc<Cell<u32>>);
    impl Disposable for Counter {
        fn dispose(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn dispose_is_reverse_order_and_idempotent() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let scope = Scope::new(None);

        struct Tracker(Rc<RefCell<Vec<u32>>>, u32);
        impl Disposable for Tracker {
            fn dispose(&self) {
                self.0.borrow_mut().push(self.1);
            }
        }

        scope.register(Rc::new(Tracker(order.clone(), 1)));
        scope.register(Rc::new(Tracker(order.clone(), 2)));
        scope.register(Rc::new(Tracker(order.clone(), 3)));

        scope.dispose();
        assert_eq!(*order.borrow(), vec![3, 2, 1]);

        scope.dispose(); // no-op
        assert_eq!(*order.borrow(), vec![3, 2, 1]);
    }

    #[test]
    fn enter_scopes_registration() {
        let count = Rc::new(Cell::new(0));
        let scope = Scope::new(None);
        scope.enter(|| {
            register_with_current_owner(Rc::new(Counter(count.clone())));
        });
        assert_eq!(count.get(), 0);
        scope.dispose();
        assert_eq!(count.get(), 1);
    }
}
