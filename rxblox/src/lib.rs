//! A fine-grained reactive runtime: signals, computed values, async signals,
//! and a disposal-scoped operator pipeline.
//!
//! The propagation engine (dependency graph, batching, glitch-free two-phase
//! flush) lives in `rxblox-runtime` and knows nothing about values; this
//! crate layers value storage, equality policy, disposal scopes, tags, and
//! the operator algebra on top of it.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`, no `Send`/`Sync`
//! bound anywhere): see `DESIGN.md` for why that axis was dropped relative
//! to the teacher crate this was grounded on.

mod async_task;
mod devtools;
mod effect;
mod equality;
mod error;
mod lens;
mod logic;
mod operators;
mod options;
mod scheduler;
mod scope;
mod signal;
mod subscription;
mod tag;

pub use async_task::{AsyncComputed, BoxFuture, CancelToken, TaskView};
pub use effect::Effect;
pub use equality::Equality;
pub use error::{AsyncError, ComputeError, ContractError};
pub use lens::{Lens, Selector};
pub use options::SignalOptions;
pub use scheduler::{scheduler, set_scheduler, ManualScheduler, Scheduler, TimerHandle};
pub use scope::{current_owner, root_scope, Disposable, Scope};
pub use signal::{from_all, Computed, DynSignal, Mutable, Notifier, WeakSignal};
pub use subscription::Subscription;
pub use tag::{for_each_across, tag, Tag, TagMember};

pub use rxblox_runtime::SignalId;

/// Runs `f`, coalescing every mutation performed within it (directly or via
/// nested `batch` calls) into a single propagation pass after it returns
/// (§4.2).
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    rxblox_runtime::batch(f)
}

/// Runs `f` outside of any ambient tracking frame: reads inside `f` are not
/// recorded as a dependency of an enclosing `Computed`/`Effect` (§4.2:
/// "untrack/peek semantics").
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    rxblox_runtime::untrack(f)
}

/// Polls every pending async computation once, advancing `task()`/
/// `AsyncComputed` state. Call this from a host event loop (or directly in
/// tests) the same way `ManualScheduler::advance` drives timers.
pub fn pump() {
    async_task::pump();
}

pub mod logic_registry {
    //! Named singleton factories over the scope model (§4.6).
    pub use crate::logic::{clear, dispose, logic, provide};
}

pub mod devtools_api {
    //! The devtools event ring (§6's devtools contract).
    pub use crate::devtools::{clear, snapshot, subscribe, unsubscribe, DevtoolsEvent};
}

pub mod ops {
    //! The operator algebra (§4.4): `pipe`, `map`, `filter`, `scan`,
    //! `distinct`, `distinct_until_changed`, `debounce`, `throttle`, `delay`,
    //! `refresh_on`, `stale_on`, `task`.
    pub use crate::operators::{
        debounce, delay, distinct, distinct_by, distinct_until_changed, filter, map, map_mutable,
        pipe, refresh_on, scan, stale_on, task, task_view, throttle,
    };
}
