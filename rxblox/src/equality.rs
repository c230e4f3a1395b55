//! Change predicates (C2). Defaults to identity/structural equality for
//! primitives and shallow equality for containers; deep and custom are
//! opt-in, per the design-notes guidance ("deep is opt-in because it is
//! O(n) per set").

use std::rc::Rc;

/// How two successive values of a signal are compared to decide whether a
/// `set`/recompute is an observable change.
#[derive(Clone)]
pub enum Equality<T> {
    /// `PartialEq`, compares owned values directly.
    Strict,
    /// A user-supplied shallow comparator — e.g. pointer/length/element
    /// comparison for `Rc<[T]>` or `Vec<T>`, where a full `Strict`/`Deep`
    /// compare would be wasteful.
    Shallow(Rc<dyn Fn(&T, &T) -> bool>),
    /// `PartialEq` as well, but named distinctly so callers can express
    /// intent ("I want a full structural compare") even though, in Rust,
    /// `Strict` and `Deep` resolve to the same `PartialEq` call.
    Deep,
    /// An arbitrary comparator.
    Custom(Rc<dyn Fn(&T, &T) -> bool>),
}

impl<T> Equality<T> {
    pub fn shallow(f: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::Shallow(Rc::new(f))
    }

    pub fn custom(f: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::Custom(Rc::new(f))
    }
}

impl<T: PartialEq> Equality<T> {
    pub fn eq(&self, a: &T, b: &T) -> bool {
        match self {
            Equality::Strict | Equality::Deep => a == b,
            Equality::Shallow(f) | Equality::Custom(f) => f(a, b),
        }
    }
}

impl<T> Default for Equality<T> {
    fn default() -> Self {
        Equality::Strict
    }
}

impl<T> std::fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Equality::Strict => "Strict",
            Equality::Shallow(_) => "Shallow",
            Equality::Deep => "Deep",
            Equality::Custom(_) => "Custom",
        };
        f.debug_tuple("Equality").field(&tag).finish()
    }
}
