//! Devtools event ring (§6's devtools contract, C14).
//!
//! A bounded, dependency-free sink signals report lifecycle events to. This
//! is the mandatory observability surface the core promises regardless of
//! whether the `trace` feature (optional `tracing` spans, §4.10) is enabled
//! — enabling/disabling a sink is idempotent and never affects signal
//! behavior.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use rxblox_runtime::SignalId;

use crate::error;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum DevtoolsEvent {
    SignalCreated { id: SignalId, name: Rc<str> },
    SignalChanged { id: SignalId, name: Rc<str>, old_version: u64, new_version: u64 },
    SignalDisposed { id: SignalId, name: Rc<str> },
    BatchCommitted { changed: usize },
    ListenerError { id: SignalId, name: Rc<str>, message: Rc<str> },
}

thread_local! {
    static RING: RefCell<Ring> = RefCell::new(Ring::new(DEFAULT_CAPACITY));
    /// Tracks each live signal's name so a caught listener panic (reported by
    /// `rxblox-runtime` with only a `SignalId`) can still be turned into a
    /// named `ListenerError` event.
    static NAMES: RefCell<HashMap<SignalId, Rc<str>>> = RefCell::new(HashMap::new());
    static HOOKS_INSTALLED: Cell<bool> = Cell::new(false);
}

struct Ring {
    capacity: usize,
    events: VecDeque<DevtoolsEvent>,
    sink: Option<Rc<dyn Fn(&DevtoolsEvent)>>,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self { capacity, events: VecDeque::with_capacity(capacity), sink: None }
    }

    fn push(&mut self, event: DevtoolsEvent) {
        if let Some(sink) = &self.sink {
            sink(&event);
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Records an event, overwriting the oldest entry once the ring is full.
/// With the `trace` feature enabled, also mirrors it as a `tracing` event.
pub(crate) fn emit(event: DevtoolsEvent) {
    ensure_hooks_installed();

    match &event {
        DevtoolsEvent::SignalCreated { id, name } => {
            NAMES.with(|n| n.borrow_mut().insert(*id, name.clone()));
        }
        DevtoolsEvent::SignalDisposed { id, .. } => {
            NAMES.with(|n| n.borrow_mut().remove(id));
        }
        _ => {}
    }

    #[cfg(feature = "trace")]
    mirror_to_tracing(&event);

    RING.with(|r| r.borrow_mut().push(event));
}

/// Wires `rxblox-runtime`'s listener-panic and batch-committed hooks into
/// this module's event ring, once per thread. `rxblox-runtime` only knows
/// `SignalId`s; this layer resolves them back to a name via `NAMES`.
fn ensure_hooks_installed() {
    HOOKS_INSTALLED.with(|installed| {
        if installed.get() {
            return;
        }
        installed.set(true);

        rxblox_runtime::set_listener_panic_hook(|id, payload| {
            let name = name_of(id);
            let message = error::panic_message(payload);
            emit(DevtoolsEvent::ListenerError { id, name, message });
        });

        rxblox_runtime::set_batch_committed_hook(|changed| {
            emit(DevtoolsEvent::BatchCommitted { changed });
        });
    });
}

fn name_of(id: SignalId) -> Rc<str> {
    NAMES
        .with(|n| n.borrow().get(&id).cloned())
        .unwrap_or_else(|| Rc::from(format!("signal-{}", id.raw()).as_str()))
}

#[cfg(feature = "trace")]
fn mirror_to_tracing(event: &DevtoolsEvent) {
    match event {
        DevtoolsEvent::SignalCreated { id, name } => {
            tracing::debug!(signal_id = ?id, %name, "signal created");
        }
        DevtoolsEvent::SignalChanged { id, name, old_version, new_version } => {
            tracing::trace!(signal_id = ?id, %name, old_version, new_version, "signal changed");
        }
        DevtoolsEvent::SignalDisposed { id, name } => {
            tracing::debug!(signal_id = ?id, %name, "signal disposed");
        }
        DevtoolsEvent::BatchCommitted { changed } => {
            tracing::trace!(changed, "batch committed");
        }
        DevtoolsEvent::ListenerError { id, name, message } => {
            tracing::warn!(signal_id = ?id, %name, %message, "listener panicked");
        }
    }
}

/// Registers (or replaces) the sink invoked synchronously for every new
/// event, in addition to it being retained in the ring. Idempotent: calling
/// this twice simply replaces the previous sink.
pub fn subscribe(sink: impl Fn(&DevtoolsEvent) + 'static) {
    RING.with(|r| r.borrow_mut().sink = Some(Rc::new(sink)));
}

/// Disconnects the sink without affecting signals or the retained ring.
pub fn unsubscribe() {
    RING.with(|r| r.borrow_mut().sink = None);
}

/// A snapshot of currently retained events, oldest first.
pub fn snapshot() -> Vec<DevtoolsEvent> {
    RING.with(|r| r.borrow().events.iter().cloned().collect())
}

pub fn clear() {
    RING.with(|r| r.borrow_mut().events.clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_overwrites_oldest_when_full() {
        RING.with(|r| *r.borrow_mut() = Ring::new(2));
        emit(DevtoolsEvent::BatchCommitted { changed: 1 });
        emit(DevtoolsEvent::BatchCommitted { changed: 2 });
        emit(DevtoolsEvent::BatchCommitted { changed: 3 });
        let snap = snapshot();
        assert_eq!(snap.len(), 2);
        assert!(matches!(snap[0], DevtoolsEvent::BatchCommitted { changed: 2 }));
        assert!(matches!(snap[1], DevtoolsEvent::BatchCommitted { changed: 3 }));
        clear();
        RING.with(|r| *r.borrow_mut() = Ring::new(DEFAULT_CAPACITY));
    }
}
