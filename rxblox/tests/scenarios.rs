//! The six concrete walkthroughs named in the core design's testable
//! properties section, each as its own test.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rxblox::ops::{distinct_until_changed, map_mutable};
use rxblox::{
    batch, pump, set_scheduler, AsyncComputed, Computed, Lens, ManualScheduler, Mutable, Scheduler,
    Scope,
};

#[test]
fn counter_doubles_on_change() {
    let c = Mutable::new(0);
    let c2 = c.clone();
    let double = Computed::new(move || c2.get() * 2);
    let emissions = Rc::new(RefCell::new(Vec::new()));
    let e = emissions.clone();
    let double2 = double.clone();
    let _sub = double.on(move || e.borrow_mut().push(double2.peek()));

    c.set(3);

    assert_eq!(double.get(), 6);
    assert_eq!(*emissions.borrow(), vec![6]);
}

#[test]
fn distinct_until_changed_suppresses_repeats() {
    let s = Mutable::new(1);
    let s2 = s.clone();
    let d = distinct_until_changed(&map_mutable(&s2, |v| v), |a, b| a == b);
    let spy = Rc::new(RefCell::new(Vec::new()));
    let spy2 = spy.clone();
    let d2 = d.clone();
    let _sub = d.on(move || spy2.borrow_mut().push(d2.peek()));

    s.set(1);
    s.set(2);
    s.set(2);
    s.set(3);

    assert_eq!(*spy.borrow(), vec![2, 3]);
}

#[test]
fn batch_settles_dependents_exactly_once() {
    let a = Mutable::new(1);
    let b = Mutable::new(2);
    let a2 = a.clone();
    let b2 = b.clone();
    let sum = Computed::new(move || a2.get() + b2.get());
    let calls = Rc::new(RefCell::new(0));
    let calls2 = calls.clone();
    let _sub = sum.on(move || *calls2.borrow_mut() += 1);

    batch(|| {
        a.set(10);
        b.set(20);
    });

    assert_eq!(*calls.borrow(), 1);
    assert_eq!(sum.get(), 30);
}

#[test]
fn async_cancel_discards_superseded_response() {
    let query = Mutable::new("a".to_string());
    let q = query.clone();
    let task: AsyncComputed<String> = AsyncComputed::new(
        move |_cancel| {
            let url = q.get();
            Box::pin(async move { Ok(format!("response-for-{url}")) })
        },
        None,
    );

    task.view(); // starts fetching "a"
    query.set("b".to_string());
    task.view(); // starts fetching "b", supersedes "a"
    pump();

    let view = task.peek_view();
    assert_eq!(view.value, Some("response-for-b".to_string()));
}

#[test]
fn disposal_clears_timer_and_forbids_further_writes() {
    let clock = Rc::new(ManualScheduler::new());
    set_scheduler(clock.clone());

    let scope = Scope::new(Some("session".to_string()));
    let x = scope.enter(|| {
        let x = Mutable::new(0);
        let x2 = x.clone();
        let handle = clock.schedule(
            Duration::from_millis(100),
            Box::new(move || x2.set(x2.peek() + 1)),
        );
        let clock_for_cleanup = clock.clone();
        scope.on_dispose(move || clock_for_cleanup.cancel(handle));
        x
    });

    assert_eq!(clock.pending(), 1);
    scope.dispose();
    assert_eq!(clock.pending(), 0); // timer cleared
    assert!(x.is_disposed());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| x.set(1)));
    assert!(result.is_err());

    clock.advance(Duration::from_millis(200)); // confirms the cancelled timer never fires
    assert_eq!(x.peek(), 0);
}

#[test]
fn lens_write_reaches_nested_field_with_one_notification() {
    #[derive(Clone, PartialEq, Debug)]
    struct User {
        name: String,
    }
    #[derive(Clone, PartialEq, Debug)]
    struct Form {
        user: User,
    }

    let form = Mutable::new(Form { user: User { name: "A".to_string() } });
    let notifications = Rc::new(RefCell::new(0));
    let n = notifications.clone();
    let _sub = form.on(move || *n.borrow_mut() += 1);

    let f_get = form.clone();
    let f_set = form.clone();
    let name_lens: Lens<String> = Lens::new(
        move || f_get.get().user.name.clone(),
        move |new_name| {
            f_set.update(|f| Form { user: User { name: new_name.clone() } });
        },
    );

    name_lens.set("B".to_string());

    assert_eq!(form.peek().user.name, "B");
    assert_eq!(name_lens.get(), "B");
    assert_eq!(*notifications.borrow(), 1);
}
