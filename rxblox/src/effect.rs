//! Side-effecting reactions (grounded on `flourish::effect::EffectSR`).
//!
//! An `Effect` subscribes to whatever it reads just like a computed signal,
//! but instead of caching a value for others to read, it exists purely for
//! its side effects. It runs once immediately on construction (mirroring
//! `EffectSR::new`'s `box_.as_ref().pull()`), then again every batch in
//! which one of its dependencies changed. The `cleanup` closure — "both
//! closures are part of the dependency detection scope" in the teacher's
//! doc comment no longer applies here: only `body` is tracked, since
//! `cleanup` runs against the *previous* output and has nothing to read.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rxblox_runtime::SignalId;

use crate::scope::{self, Disposable};

struct EffectInner<T> {
    id: SignalId,
    body: RefCell<Box<dyn FnMut() -> T>>,
    cleanup: RefCell<Box<dyn FnMut(T)>>,
    last: RefCell<Option<T>>,
    disposed: Cell<bool>,
}

/// `#[must_use]` mirrors the teacher's own annotation: effects are cancelled
/// when their last handle is dropped, just like `EffectSR`.
#[must_use = "effects are cancelled when dropped"]
pub struct Effect<T> {
    inner: Rc<EffectInner<T>>,
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: 'static> Effect<T> {
    /// Runs `body` immediately and on every subsequent change to a signal it
    /// read. `cleanup` runs on the previous output right before `body` runs
    /// again, and once more when the effect is disposed or dropped.
    pub fn new(body: impl FnMut() -> T + 'static, cleanup: impl FnMut(T) + 'static) -> Self {
        let id = rxblox_runtime::register();
        let inner = Rc::new(EffectInner {
            id,
            body: RefCell::new(Box::new(body)),
            cleanup: RefCell::new(Box::new(cleanup)),
            last: RefCell::new(None),
            disposed: Cell::new(false),
        });

        let weak = Rc::downgrade(&inner);
        rxblox_runtime::set_refresh_callback(
            id,
            Some(Rc::new(move || {
                weak.upgrade()
                    .map(|inner| {
                        EffectInner::run(&inner);
                        true
                    })
                    .unwrap_or(false)
            })),
        );
        // A no-op listener keeps this id "has listeners" so batch flush
        // actually calls the refresh callback above instead of leaving the
        // effect lazily stale forever (effects must react without being read).
        rxblox_runtime::add_listener(id, Rc::new(|| {}));

        EffectInner::run(&inner);

        let effect = Self { inner };
        scope::register_with_current_owner(Rc::new(effect.clone()));
        effect
    }
}

impl<T> EffectInner<T> {
    fn run(inner: &Rc<Self>) {
        if inner.disposed.get() {
            return;
        }
        if let Some(prev) = inner.last.borrow_mut().take() {
            (inner.cleanup.borrow_mut())(prev);
        }
        let value = rxblox_runtime::track_compute(inner.id, || (inner.body.borrow_mut())());
        *inner.last.borrow_mut() = Some(value);
    }

    fn cancel(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(prev) = self.last.borrow_mut().take() {
            (self.cleanup.borrow_mut())(prev);
        }
        rxblox_runtime::dispose(self.id);
    }
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<T> Disposable for Effect<T> {
    fn dispose(&self) {
        self.inner.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Mutable;
    use std::rc::Rc;

    #[test]
    fn runs_immediately_and_on_change() {
        let count = Rc::new(Cell::new(0));
        let a = Mutable::new(1);
        let runs = count.clone();
        let a2 = a.clone();
        let _effect = Effect::new(
            move || {
                runs.set(runs.get() + 1);
                a2.get()
            },
            |_| {},
        );
        assert_eq!(count.get(), 1);
        a.set(2);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn cleanup_runs_before_next_body_and_on_drop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = Mutable::new(1);
        let body_log = log.clone();
        let cleanup_log = log.clone();
        let a2 = a.clone();
        let effect = Effect::new(
            move || {
                let v = a2.get();
                body_log.borrow_mut().push(format!("run {v}"));
                v
            },
            move |v| cleanup_log.borrow_mut().push(format!("cleanup {v}")),
        );
        a.set(2);
        drop(effect);
        assert_eq!(
            *log.borrow(),
            vec![
                "run 1".to_string(),
                "cleanup 1".to_string(),
                "run 2".to_string(),
                "cleanup 2".to_string(),
            ]
        );
    }
}
