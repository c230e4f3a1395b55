//! Pluggable timer facility for `debounce`/`throttle`/`delay` (§5: "use the
//! host's timer facility").
//!
//! The core itself never blocks or spawns OS threads — doing so would cross
//! the `Rc`/`RefCell` single-threaded boundary this runtime is built on.
//! Instead, a [`Scheduler`] is a collaborator interface: a real host (a GUI
//! event loop, a game loop, a test harness) drives it. [`ManualScheduler`],
//! the default, is a deterministic virtual clock intended for exactly that:
//! the host (or a test) calls [`ManualScheduler::advance`] from its own
//! single-threaded pump, and queued callbacks fire in due-time order, ties
//! broken by registration order — matching §5's "relative order of timed
//! emissions matches the order timers fire".

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

pub trait Scheduler {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle;
    fn cancel(&self, handle: TimerHandle);
}

struct PendingTimer {
    handle: TimerHandle,
    fire_at: Duration,
    sequence: u64,
    callback: Option<Box<dyn FnOnce()>>,
}

/// A virtual clock: time only moves when [`advance`](ManualScheduler::advance)
/// is called, making operator chains built on it fully deterministic in tests.
#[derive(Default)]
pub struct ManualScheduler {
    state: RefCell<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_handle: u64,
    next_sequence: u64,
    timers: Vec<PendingTimer>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Advances the virtual clock by `by` and runs every timer whose
    /// due time has arrived, in `(fire_at, registration order)`.
    pub fn advance(&self, by: Duration) {
        let new_now = {
            let mut state = self.state.borrow_mut();
            state.now += by;
            state.now
        };
        loop {
            let due = {
                let mut state = self.state.borrow_mut();
                let mut due_index = None;
                for (i, timer) in state.timers.iter().enumerate() {
                    if timer.fire_at > new_now {
                        continue;
                    }
                    match due_index {
                        None => due_index = Some(i),
                        Some(best) => {
                            let better = (timer.fire_at, timer.sequence)
                                < (state.timers[best].fire_at, state.timers[best].sequence);
                            if better {
                                due_index = Some(i);
                            }
                        }
                    }
                }
                due_index.map(|i| state.timers.remove(i))
            };
            match due {
                Some(mut timer) => {
                    if let Some(cb) = timer.callback.take() {
                        cb();
                    }
                }
                None => break,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let mut state = self.state.borrow_mut();
        state.next_handle += 1;
        state.next_sequence += 1;
        let handle = TimerHandle(state.next_handle);
        let fire_at = state.now + delay;
        let sequence = state.next_sequence;
        state.timers.push(PendingTimer { handle, fire_at, sequence, callback: Some(callback) });
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        self.state.borrow_mut().timers.retain(|t| t.handle != handle);
    }
}

thread_local! {
    static SCHEDULER: RefCell<Rc<dyn Scheduler>> = RefCell::new(Rc::new(ManualScheduler::new()));
}

/// Swaps in a host-provided scheduler (e.g. one backed by a real event loop).
pub fn set_scheduler(scheduler: Rc<dyn Scheduler>) {
    SCHEDULER.with(|s| *s.borrow_mut() = scheduler);
}

pub fn scheduler() -> Rc<dyn Scheduler> {
    SCHEDULER.with(|s| s.borrow().clone())
}
