//! Named singleton factories over the scope model (§4.6's "logic factory").
//!
//! `logic(name, builder)` runs `builder` inside a fresh [`Scope`] the first
//! time a given `name` is requested and caches the result; later calls with
//! the same name return the cached instance without re-running `builder`.
//! `logic.clear()`/`logic.dispose(name)` tear down the owning scope(s),
//! which in turn disposes every signal/subscription/effect the builder
//! created.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::scope::Scope;

struct Entry {
    scope: Scope,
    instance: Rc<dyn Any>,
}

thread_local! {
    static REGISTRY: RefCell<HashMap<String, Entry>> = RefCell::new(HashMap::new());
}

/// Runs `builder` the first time `name` is requested, inside its own scope;
/// returns the cached instance on subsequent calls. Panics (a `Contract`
/// violation) if `name` was already built with a different `T`.
pub fn logic<T: 'static>(name: impl Into<String>, builder: impl FnOnce() -> T) -> Rc<T> {
    let name = name.into();
    if let Some(cached) = REGISTRY.with(|r| r.borrow().get(&name).map(|e| e.instance.clone())) {
        return cached
            .downcast::<T>()
            .unwrap_or_else(|_| crate::error::panic_contract(format!(
                "logic `{name}` was already constructed with a different type"
            )));
    }

    let scope = Scope::new(Some(name.clone()));
    let instance: Rc<T> = Rc::new(scope.enter(builder));
    REGISTRY.with(|r| {
        r.borrow_mut().insert(name, Entry { scope, instance: instance.clone() as Rc<dyn Any> });
    });
    instance
}

/// Registers `instance` under `name` directly, bypassing `builder` — used
/// for test injection (§4.6: `logic.provide(name, override)`).
pub fn provide<T: 'static>(name: impl Into<String>, instance: T) {
    let name = name.into();
    let scope = Scope::new(Some(name.clone()));
    REGISTRY.with(|r| {
        r.borrow_mut()
            .insert(name, Entry { scope, instance: Rc::new(instance) as Rc<dyn Any> });
    });
}

/// Disposes the scope owning `name`'s instance and forgets it.
pub fn dispose(name: &str) {
    let entry = REGISTRY.with(|r| r.borrow_mut().remove(name));
    if let Some(entry) = entry {
        entry.scope.dispose();
    }
}

/// Disposes every registered logic and clears the registry.
pub fn clear() {
    let entries: Vec<Entry> = REGISTRY.with(|r| r.borrow_mut().drain().map(|(_, e)| e).collect());
    for entry in entries {
        entry.scope.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn second_call_reuses_instance() {
        clear();
        let calls = Rc::new(Cell::new(0));
        let c1 = calls.clone();
        let a = logic("counter", move || {
            c1.set(c1.get() + 1);
            42
        });
        let c2 = calls.clone();
        let b = logic("counter", move || {
            c2.set(c2.get() + 1);
            99
        });
        assert_eq!(*a, 42);
        assert_eq!(*b, 42);
        assert_eq!(calls.get(), 1);
        clear();
    }
}
