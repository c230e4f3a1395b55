//! Operator algebra (C8, §4.4): `pipe` plus the individual operators.
//!
//! Every operator here is a thin, named constructor over `Computed`,
//! `Effect`, or `AsyncComputed` — there is no separate "operator" type. This
//! mirrors how the teacher expresses `Signal` combinators (`map`, `filter`,
//! `map_uncached`, …) as plain functions returning another `Signal`, rather
//! than introducing an operator-specific wrapper type per combinator.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::hash::Hash;
use std::rc::Rc;
use std::time::Duration;

use crate::async_task::{AsyncComputed, BoxFuture, CancelToken, TaskView};
use crate::equality::Equality;
use crate::error::AsyncError;
use crate::options::SignalOptions;
use crate::scheduler::{self, TimerHandle};
use crate::signal::{Computed, Mutable, Notifier};
use crate::subscription::Subscription;

/// Threads a value through a sequence of transforms (§6: "pipe(...ops)").
/// `rxblox` has no dedicated `Pipeable` trait — this is just function
/// application, kept as a named helper so call sites read the same as the
/// table in §4.4 (`pipe(source, map(f), filter(p), distinct())`).
pub fn pipe<T>(source: T, op: impl FnOnce(T) -> T) -> T {
    op(source)
}

/// Projects every value of `source` through `f`.
pub fn map<A, B>(source: &Computed<A>, f: impl Fn(A) -> B + 'static) -> Computed<B>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
{
    let source = source.clone();
    Computed::new(move || f(source.get()))
}

/// Like [`map`], but for a plain `Mutable` source (the common case of
/// deriving a `Computed` from user input without an intermediate signal).
pub fn map_mutable<A, B>(source: &Mutable<A>, f: impl Fn(A) -> B + 'static) -> Computed<B>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
{
    let source = source.clone();
    Computed::new(move || f(source.get()))
}

/// Keeps `source`'s value only while `predicate` holds; while it doesn't,
/// reuses `source`'s previous passing value rather than producing an
/// `Option` (§4.4 table: "filter — mirrors last passing value").
pub fn filter<T>(source: &Computed<T>, predicate: impl Fn(&T) -> bool + 'static) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    let source = source.clone();
    let last: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    Computed::new(move || {
        let value = source.get();
        if predicate(&value) {
            *last.borrow_mut() = Some(value.clone());
            value
        } else {
            last.borrow()
                .clone()
                .unwrap_or_else(|| panic!("filter: predicate rejected the first-ever value with no prior passing value to fall back to"))
        }
    })
}

/// Folds `source`'s successive values into an accumulator, seeded with
/// `initial` (§4.4 table: "scan — fold over successive emissions").
pub fn scan<T, Acc>(
    source: &Computed<T>,
    initial: Acc,
    fold: impl Fn(Acc, T) -> Acc + 'static,
) -> Computed<Acc>
where
    T: Clone + PartialEq + 'static,
    Acc: Clone + PartialEq + 'static,
{
    let source = source.clone();
    let acc = Rc::new(RefCell::new(Some(initial)));
    Computed::new(move || {
        let value = source.get();
        let prev = acc.borrow_mut().take().expect("scan accumulator missing between recomputes");
        let next = fold(prev, value);
        *acc.borrow_mut() = Some(next.clone());
        next
    })
}

/// Suppresses any value whose key was ever seen before, not just the
/// immediately-previous one — maintains an unbounded set of keys for the
/// lifetime of the returned signal (§4.4 table: "distinct(key?) — suppresses
/// any value whose key was ever seen"). For source sequence `1, 2, 1, 3` this
/// mirrors `1, 2, _, 3` (the second `1` is suppressed, unlike
/// [`distinct_until_changed`], which only dedupes consecutive repeats).
pub fn distinct<T>(source: &Computed<T>) -> Computed<T>
where
    T: Clone + PartialEq + Eq + Hash + 'static,
{
    distinct_by(source, |value: &T| value.clone())
}

/// Like [`distinct`], but the "ever seen" set is keyed by `key(value)`
/// instead of the value itself (§4.4 table: "distinct(key?)").
pub fn distinct_by<T, K>(source: &Computed<T>, key: impl Fn(&T) -> K + 'static) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    K: Eq + Hash + 'static,
{
    let source = source.clone();
    let seen: Rc<RefCell<HashSet<K>>> = Rc::new(RefCell::new(HashSet::new()));
    let last: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    Computed::new(move || {
        let value = source.get();
        let is_new = seen.borrow_mut().insert(key(&value));
        if is_new {
            *last.borrow_mut() = Some(value.clone());
            value
        } else {
            last.borrow().clone().unwrap_or_else(|| {
                panic!("distinct: first-ever value was already considered seen")
            })
        }
    })
}

/// Suppresses re-emission when `same` reports the new value equivalent to
/// the previous one, for types (or notions of equivalence) that aren't
/// plain `PartialEq` (§4.4 table: "distinctUntilChanged — custom comparator").
pub fn distinct_until_changed<T>(
    source: &Computed<T>,
    same: impl Fn(&T, &T) -> bool + 'static,
) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    let source = source.clone();
    Computed::new_with(move || source.get(), SignalOptions::new().equals(Equality::custom(same)))
}

/// Emits `source`'s latest value only after it has been quiet for `delay`
/// (§4.4 table: "debounce — trailing-edge, timer reset on each emission").
/// Built on an `Effect` that reads `source` (so it reruns on every change)
/// and a `Mutable` output signal the timer callback writes into; the timer
/// itself comes from [`scheduler::scheduler`], so this is driven in lockstep
/// with whatever the host (or `ManualScheduler` in tests) advances.
pub fn debounce<T>(source: &Computed<T>, delay: Duration) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    let initial = source.peek();
    let output = Mutable::new(initial);
    let pending: Rc<RefCell<Option<TimerHandle>>> = Rc::new(RefCell::new(None));
    let source = source.clone();
    let out = output.clone();
    let _effect = crate::effect::Effect::new(
        move || {
            let value = source.get();
            if let Some(handle) = pending.borrow_mut().take() {
                scheduler::scheduler().cancel(handle);
            }
            let out2 = out.clone();
            let handle = scheduler::scheduler().schedule(delay, Box::new(move || out2.set(value)));
            *pending.borrow_mut() = Some(handle);
        },
        |_: ()| {},
    );
    // Leaking the effect handle into the returned Computed's closure keeps it
    // alive exactly as long as the output it drives; held here so dropping
    // the operator's `Computed` also cancels future debounced emissions.
    let kept_effect = _effect;
    Computed::new(move || {
        let _keep_alive = &kept_effect;
        output.get()
    })
}

/// Emits at most one value per `interval`, leading-edge (§4.4 table:
/// "throttle — leading edge, trailing drop"): the first emission in a
/// window passes immediately, subsequent ones within the same window are
/// dropped, and the window reopens after `interval` elapses with no further
/// scheduling until the next source emission.
pub fn throttle<T>(source: &Computed<T>, interval: Duration) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    let initial = source.peek();
    let output = Mutable::new(initial);
    let locked = Rc::new(Cell::new(false));
    // The effect's own construction-time run would otherwise consume the
    // leading edge with the seed value before any real emission happens.
    let first_run = Rc::new(Cell::new(true));
    let source = source.clone();
    let out = output.clone();
    let effect = crate::effect::Effect::new(
        move || {
            let value = source.get();
            if first_run.replace(false) {
                return;
            }
            if locked.get() {
                return;
            }
            out.set(value);
            locked.set(true);
            let lock = locked.clone();
            scheduler::scheduler().schedule(interval, Box::new(move || lock.set(false)));
        },
        |_: ()| {},
    );
    Computed::new(move || {
        let _keep_alive = &effect;
        output.get()
    })
}

/// Delays every emission of `source` by a fixed `delay`, preserving order
/// (§4.4 table: "delay — fixed latency, order-preserving"). Each source
/// emission schedules its own timer; since `ManualScheduler` fires due
/// timers in `(fire_at, registration order)`, emissions that would overtake
/// an earlier one never do.
pub fn delay<T>(source: &Computed<T>, delay: Duration) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    let initial = source.peek();
    let output = Mutable::new(initial);
    let source = source.clone();
    let out = output.clone();
    let effect = crate::effect::Effect::new(
        move || {
            let value = source.get();
            let out2 = out.clone();
            scheduler::scheduler().schedule(delay, Box::new(move || out2.set(value)));
        },
        |_: ()| {},
    );
    Computed::new(move || {
        let _keep_alive = &effect;
        output.get()
    })
}

/// Re-triggers `target`'s recomputation (via `refresh()`) every time
/// `trigger` notifies or changes (§4.4 table: "refreshOn — force a
/// recompute-and-notify on an external trigger, bypassing equality").
pub fn refresh_on<T>(target: &Computed<T>, trigger: &Notifier) -> Subscription
where
    T: Clone + PartialEq + 'static,
{
    let target = target.clone();
    trigger.on(move || target.refresh())
}

/// Marks `target` stale (without forcing a recompute) every time `trigger`
/// notifies or changes (§4.4 table: "staleOn — lazy invalidation: wait for
/// the next read instead of recomputing eagerly").
pub fn stale_on<T>(target: &Computed<T>, trigger: &Notifier) -> Subscription
where
    T: Clone + PartialEq + 'static,
{
    let target = target.clone();
    trigger.on(move || target.stale())
}

/// Wraps an async compute function as a synchronous `{loading, value,
/// error}` view, seeded with `seed` until the first resolution lands
/// (§4.4 table: "task — converts an async signal into a pollable view";
/// §6: "task(seed)").
pub fn task<T>(
    compute: impl Fn(CancelToken) -> BoxFuture<Result<T, AsyncError>> + 'static,
    seed: Option<T>,
) -> AsyncComputed<T>
where
    T: Clone + 'static,
{
    AsyncComputed::new(compute, seed)
}

/// Reads a [`TaskView`] off an [`AsyncComputed`], tracking it as a
/// dependency — a convenience so `task()` results can flow straight into a
/// `Computed::new` closure without reaching for `.view()` directly.
pub fn task_view<T: Clone + 'static>(task: &AsyncComputed<T>) -> TaskView<T> {
    task.view()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{set_scheduler, ManualScheduler};
    use std::rc::Rc;

    fn fresh_clock() -> Rc<ManualScheduler> {
        let clock = Rc::new(ManualScheduler::new());
        set_scheduler(clock.clone());
        clock
    }

    #[test]
    fn map_projects_every_value() {
        let a = Mutable::new(2);
        let doubled = map_mutable(&a, |v| v * 2);
        assert_eq!(doubled.get(), 4);
        a.set(5);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn filter_mirrors_last_passing_value() {
        let a = Mutable::new(2);
        let a2 = a.clone();
        let evens = filter(&map_mutable(&a2, |v| v), |v: &i32| v % 2 == 0);
        assert_eq!(evens.get(), 2);
        a.set(3);
        assert_eq!(evens.get(), 2); // odd suppressed, previous passing value kept
        a.set(4);
        assert_eq!(evens.get(), 4);
    }

    #[test]
    fn distinct_suppresses_any_previously_seen_value_not_just_consecutive() {
        let a = Mutable::new(1);
        let a2 = a.clone();
        let d = distinct(&map_mutable(&a2, |v| v));
        assert_eq!(d.get(), 1);
        a.set(2);
        assert_eq!(d.get(), 2);
        a.set(1); // already seen, even though it's not the immediately-previous value
        assert_eq!(d.get(), 2);
        a.set(3);
        assert_eq!(d.get(), 3);
    }

    #[test]
    fn scan_folds_over_emissions() {
        let a = Mutable::new(0);
        let a2 = a.clone();
        let running_total = scan(&map_mutable(&a2, |v| v), 0, |acc, v| acc + v);
        a.set(1);
        assert_eq!(running_total.get(), 1);
        a.set(2);
        assert_eq!(running_total.get(), 3);
    }

    #[test]
    fn debounce_only_emits_after_quiet_period() {
        let clock = fresh_clock();
        let a = Mutable::new(0);
        let a2 = a.clone();
        let debounced = debounce(&map_mutable(&a2, |v| v), Duration::from_millis(50));
        assert_eq!(debounced.get(), 0);
        a.set(1);
        a.set(2);
        clock.advance(Duration::from_millis(30));
        assert_eq!(debounced.get(), 0); // still quiet period, timer was reset by the 2nd set
        clock.advance(Duration::from_millis(30));
        assert_eq!(debounced.get(), 2);
    }

    #[test]
    fn throttle_drops_within_window_then_reopens() {
        let clock = fresh_clock();
        let a = Mutable::new(0);
        let a2 = a.clone();
        let throttled = throttle(&map_mutable(&a2, |v| v), Duration::from_millis(100));
        a.set(1);
        assert_eq!(throttled.get(), 1); // leading edge passes immediately
        a.set(2);
        assert_eq!(throttled.get(), 1); // dropped, still in window
        clock.advance(Duration::from_millis(100));
        a.set(3);
        assert_eq!(throttled.get(), 3); // window reopened
    }

    #[test]
    fn delay_preserves_order() {
        let clock = fresh_clock();
        let a = Mutable::new(0);
        let a2 = a.clone();
        let delayed = delay(&map_mutable(&a2, |v| v), Duration::from_millis(10));
        a.set(1);
        a.set(2);
        clock.advance(Duration::from_millis(10));
        assert_eq!(delayed.get(), 2);
    }

    #[test]
    fn stale_on_defers_recompute_to_next_read() {
        let calls = Rc::new(Cell::new(0));
        let calls2 = calls.clone();
        let c: Computed<i32> = Computed::new(move || {
            calls2.set(calls2.get() + 1);
            1
        });
        c.peek();
        let trigger = Notifier::new();
        let _sub = stale_on(&c, &trigger);
        trigger.notify();
        assert_eq!(calls.get(), 1); // not recomputed yet
        c.peek();
        assert_eq!(calls.get(), 2); // recomputed on next read
    }

    #[test]
    fn refresh_on_forces_immediate_recompute() {
        let calls = Rc::new(Cell::new(0));
        let calls2 = calls.clone();
        let c: Computed<i32> = Computed::new(move || {
            calls2.set(calls2.get() + 1);
            1
        });
        c.peek();
        let trigger = Notifier::new();
        let _sub = refresh_on(&c, &trigger);
        trigger.notify();
        assert_eq!(calls.get(), 2); // refreshed eagerly, no extra read needed
    }
}
