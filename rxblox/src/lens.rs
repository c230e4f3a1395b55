//! Selector / lens (C9, §4.5).
//!
//! A [`Selector`] is a read-only derived view, always built on top of
//! `Computed` — the same lazy, equality-gated machinery `signal.rs` already
//! provides, just specialized to the common "pick a sub-value" shape so
//! callers don't have to restate an equality policy for every projection.
//! A [`Lens`] adds a write path: a closure pair `(get, set)` rather than a
//! compiled field-path array, per the Open Question resolution recorded in
//! `DESIGN.md` — Rust has no reflection to compile a path against, and a
//! closure pair composes exactly as well via `.lens()`.

use std::rc::Rc;

use crate::equality::Equality;
use crate::options::SignalOptions;
use crate::signal::Computed;

/// A read-only derived view over a source signal. Shallow-equal by default
/// (§4.5: "selectors compare shallowly to avoid re-rendering on structurally
/// equal projections"), since most selections are field projections where a
/// deep comparison would just repeat the work the projection already did.
pub struct Selector<T> {
    computed: Computed<T>,
}

impl<T> Clone for Selector<T> {
    fn clone(&self) -> Self {
        Self { computed: self.computed.clone() }
    }
}

impl<T: Clone + PartialEq + 'static> Selector<T> {
    pub fn new(project: impl Fn() -> T + 'static) -> Self {
        Self::new_with(project, SignalOptions::new().equals(Equality::shallow(|a: &T, b: &T| a == b)))
    }

    pub fn new_with(project: impl Fn() -> T + 'static, options: SignalOptions<T>) -> Self {
        Self { computed: Computed::new_with(project, options) }
    }

    pub fn get(&self) -> T {
        self.computed.get()
    }

    pub fn peek(&self) -> T {
        self.computed.peek()
    }

    /// Chains another projection onto this one's current value, producing a
    /// new selector that re-derives whenever either stage's inputs change.
    pub fn select<U: Clone + PartialEq + 'static>(
        &self,
        project: impl Fn(&T) -> U + 'static,
    ) -> Selector<U> {
        let source = self.clone();
        Selector::new(move || project(&source.get()))
    }

    pub fn as_computed(&self) -> &Computed<T> {
        &self.computed
    }
}

/// A read-write derived view: reads project through `get`, writes route
/// back through `set` (§4.5: "a lens must round-trip: `set(path, get(path,
/// s)) == s`" — enforcing that law is the caller's responsibility, since it
/// depends on the specific `get`/`set` pair supplied).
pub struct Lens<A> {
    get: Rc<dyn Fn() -> A>,
    set: Rc<dyn Fn(A)>,
}

impl<A> Clone for Lens<A> {
    fn clone(&self) -> Self {
        Self { get: self.get.clone(), set: self.set.clone() }
    }
}

impl<A: 'static> Lens<A> {
    pub fn new(get: impl Fn() -> A + 'static, set: impl Fn(A) + 'static) -> Self {
        Self { get: Rc::new(get), set: Rc::new(set) }
    }

    pub fn get(&self) -> A {
        (self.get)()
    }

    pub fn set(&self, value: A) {
        (self.set)(value);
    }

    pub fn update(&self, f: impl FnOnce(A) -> A) {
        let current = (self.get)();
        (self.set)(f(current));
    }

    /// Composes a sub-lens through this one: the child reads/writes a `B`
    /// carved out of this lens's `A`, with writes folded back through
    /// `merge` into a full replacement `A` that this lens's own `set` then
    /// applies (§4.5's "lens composition must be associative").
    pub fn lens<B: 'static>(
        &self,
        get_sub: impl Fn(&A) -> B + 'static,
        merge: impl Fn(A, B) -> A + 'static,
    ) -> Lens<B>
    where
        A: Clone,
    {
        let outer_get = self.get.clone();
        let outer_set = self.set.clone();
        let get_sub = Rc::new(get_sub);
        let merge = Rc::new(merge);
        let get_sub2 = get_sub.clone();
        Lens::new(
            move || get_sub2(&outer_get()),
            move |sub_value| {
                let current = (outer_get)();
                outer_set(merge(current, sub_value));
            },
        )
    }

    /// Transforms this lens's value type through an isomorphism, without
    /// touching the underlying source (§6: "lens adapters").
    pub fn map<B: 'static>(
        &self,
        forward: impl Fn(A) -> B + 'static,
        backward: impl Fn(B) -> A + 'static,
    ) -> Lens<B>
    where
        A: Clone,
    {
        let inner_get = self.get.clone();
        let inner_set = self.set.clone();
        Lens::new(move || forward(inner_get()), move |b| inner_set(backward(b)))
    }

    /// Projects this lens to a read-only selector, discarding the write path.
    pub fn as_selector(&self) -> Selector<A>
    where
        A: Clone + PartialEq,
    {
        let get = self.get.clone();
        Selector::new(move || get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Mutable;

    #[derive(Clone, PartialEq, Debug)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn selector_tracks_source_and_short_circuits_on_equal_projection() {
        let point = Mutable::new(Point { x: 1, y: 2 });
        let p2 = point.clone();
        let x = Selector::new(move || p2.get().x);
        assert_eq!(x.get(), 1);
        let before = x.as_computed().version();
        point.set(Point { x: 1, y: 99 }); // y changes, x's projection doesn't
        x.get();
        assert_eq!(x.as_computed().version(), before);
    }

    #[test]
    fn lens_round_trips_through_a_field() {
        let point = Mutable::new(Point { x: 1, y: 2 });
        let p_get = point.clone();
        let p_set = point.clone();
        let x_lens: Lens<i32> = Lens::new(
            move || p_get.get().x,
            move |new_x| p_set.update(|p| Point { x: new_x, ..p.clone() }),
        );
        assert_eq!(x_lens.get(), 1);
        x_lens.set(42);
        assert_eq!(point.peek(), Point { x: 42, y: 2 });
    }

    #[test]
    fn composed_lens_writes_back_through_parent() {
        #[derive(Clone, PartialEq, Debug)]
        struct Rect {
            origin: Point,
        }
        let rect = Mutable::new(Rect { origin: Point { x: 0, y: 0 } });
        let r_get = rect.clone();
        let r_set = rect.clone();
        let origin_lens: Lens<Point> = Lens::new(
            move || r_get.get().origin,
            move |new_origin| r_set.update(|r| Rect { origin: new_origin.clone() }),
        );
        let x_lens = origin_lens.lens(|p| p.x, |p, new_x| Point { x: new_x, ..p });
        x_lens.set(7);
        assert_eq!(rect.peek(), Rect { origin: Point { x: 7, y: 0 } });
    }
}
