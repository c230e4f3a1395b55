//! A small emission log for assertions, adapted from the teacher's
//! `flourish-extra/tests/_validator.rs` — `RefCell`-backed instead of
//! `Mutex`-backed, since this runtime has no cross-thread axis to guard
//! against.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::Debug;

pub struct Validator<T>(RefCell<VecDeque<T>>);

impl<T> Validator<T> {
    pub const fn new() -> Self {
        Self(RefCell::new(VecDeque::new()))
    }

    pub fn push(&self, value: T) {
        self.0.borrow_mut().push_back(value);
    }

    #[track_caller]
    pub fn expect(&self, expected: impl IntoIterator<Item = T>)
    where
        T: Debug + Eq,
    {
        let mut binding = self.0.borrow_mut();
        let mut a = binding.drain(..);
        let mut b = expected.into_iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => break,
                (a, b) => assert_eq!(a, b),
            }
        }
    }
}
