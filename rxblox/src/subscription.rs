//! The handle returned by `Signal::on` (§4.1, §6).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rxblox_runtime::{ListenerId, SignalId};

use crate::scope::{self, Disposable};

struct SubscriptionInner {
    id: SignalId,
    token: Cell<Option<ListenerId>>,
}

/// A live registration of a listener against a signal. Dropping this handle
/// does *not* unsubscribe (matching "`unsubscribe = s.on(l)`" being a
/// callable, not a guard) — call [`Subscription::unsubscribe`] explicitly,
/// or let the owning scope dispose it.
#[derive(Clone)]
#[must_use = "dropping a Subscription does not unsubscribe it; call .unsubscribe() or let its scope dispose it"]
pub struct Subscription {
    inner: Rc<SubscriptionInner>,
}

impl Subscription {
    /// Detaches the listener. Idempotent (P3: never invoked again after the
    /// first call, including from a concurrent clone of this handle).
    pub fn unsubscribe(&self) {
        if let Some(token) = self.inner.token.take() {
            rxblox_runtime::remove_listener(self.inner.id, token);
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.token.get().is_some()
    }
}

impl Disposable for Subscription {
    fn dispose(&self) {
        self.unsubscribe();
    }
}

pub(crate) fn attach(id: SignalId, listener: impl FnMut() + 'static) -> Subscription {
    let cell = Rc::new(RefCell::new(listener));
    let callback: Rc<dyn Fn()> = {
        let cell = cell.clone();
        Rc::new(move || (cell.borrow_mut())())
    };
    let token = rxblox_runtime::add_listener(id, callback);
    let subscription =
        Subscription { inner: Rc::new(SubscriptionInner { id, token: Cell::new(Some(token)) }) };
    scope::register_with_current_owner(Rc::new(subscription.clone()));
    subscription
}
