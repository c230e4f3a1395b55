//! A walkthrough of the core surface, in the spirit of
//! `flourish/tests/hello_flourish.rs`: one test, narrated top to bottom.

use std::cell::Cell;
use std::rc::Rc;

use rxblox::{batch, Computed, Effect, Mutable};

#[test]
fn walkthrough() {
    let a = Mutable::new(1);
    let b = Mutable::new(2);

    // Won't run yet — computed signals are lazy.
    let sum = {
        let a = a.clone();
        let b = b.clone();
        Computed::new(move || a.get() + b.get())
    };

    // Evaluate on demand.
    assert_eq!(sum.get(), 3);

    // Subscribe: keeps `sum` fresh on every batch that touches `a`/`b`.
    let result = Rc::new(Cell::new(0));
    let result2 = result.clone();
    let sum2 = sum.clone();
    let _sub = sum.on(move || result2.set(sum2.peek()));

    // Side effects, with a cleanup that runs before the next body and once
    // more on drop.
    let effect_runs = Rc::new(Cell::new(0));
    let runs = effect_runs.clone();
    let sum3 = sum.clone();
    let effect = Effect::new(
        move || {
            runs.set(runs.get() + 1);
            sum3.get()
        },
        |_| {},
    );
    assert_eq!(effect_runs.get(), 1);

    // Batched writes settle into exactly one propagation pass.
    batch(|| {
        a.set(10);
        b.set(20);
    });
    assert_eq!(sum.get(), 30);
    assert_eq!(result.get(), 30);
    assert_eq!(effect_runs.get(), 2);

    drop(effect);
    a.set(0); // no more effect runs after drop
    assert_eq!(effect_runs.get(), 2);
}
