//! Tag registry (C10, §4.7).
//!
//! Tags are identity-only containers: membership is a weak relation (tags
//! don't keep a signal alive), the inverse of how a [`crate::scope::Scope`]
//! strongly owns the signals created under it. Grounded on the same
//! strong/weak split `flourish/src/signal.rs` implements for its
//! `Signal`/`Weak` handle pair, reused here for a different relationship.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use rxblox_runtime::SignalId;

/// Implemented by every concrete signal kind's inner storage so a [`Tag`]
/// can hold a type-erased-but-still-typed weak reference to it.
pub trait TagMember<T> {
    fn id(&self) -> SignalId;
    fn peek(&self) -> T;
}

/// A named bag of signals of a single value type, supporting bulk
/// operations. Constructed with [`tag`].
pub struct Tag<T> {
    inner: Rc<RefCell<TagInner<T>>>,
}

struct TagInner<T> {
    name: Option<String>,
    members: Vec<(SignalId, Weak<dyn TagMember<T>>)>,
}

impl<T> Clone for Tag<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: 'static> Tag<T> {
    pub fn new() -> Self {
        Self::named(None)
    }

    pub fn named(name: impl Into<Option<String>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TagInner { name: name.into(), members: Vec::new() })),
        }
    }

    pub fn name(&self) -> Option<String> {
        self.inner.borrow().name.clone()
    }

    /// Registers `member` with this tag. Called by signal constructors when
    /// an `options.tags` list names this tag; not normally called by hand.
    pub fn add(&self, member: &Rc<dyn TagMember<T>>) {
        let mut inner = self.inner.borrow_mut();
        let id = member.id();
        if !inner.members.iter().any(|(existing, _)| *existing == id) {
            inner.members.push((id, Rc::downgrade(member)));
        }
    }

    /// Removes a member by id. Called automatically when a tagged signal is
    /// disposed; also usable directly.
    pub fn delete(&self, id: SignalId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.members.len();
        inner.members.retain(|(existing, _)| *existing != id);
        inner.members.len() != before
    }

    pub fn has(&self, id: SignalId) -> bool {
        self.prune_dead();
        self.inner.borrow().members.iter().any(|(existing, weak)| {
            *existing == id && weak.upgrade().is_some()
        })
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().members.clear();
    }

    pub fn size(&self) -> usize {
        self.prune_dead();
        self.inner.borrow().members.len()
    }

    /// Live members, upgraded from weak references; dead (disposed) entries
    /// are silently skipped and pruned.
    pub fn signals(&self) -> Vec<Rc<dyn TagMember<T>>> {
        self.prune_dead();
        self.inner.borrow().members.iter().filter_map(|(_, w)| w.upgrade()).collect()
    }

    pub fn for_each(&self, mut cb: impl FnMut(&Rc<dyn TagMember<T>>)) {
        for member in self.signals() {
            cb(&member);
        }
    }

    fn prune_dead(&self) {
        self.inner.borrow_mut().members.retain(|(_, w)| w.upgrade().is_some());
    }
}

impl<T: 'static> Default for Tag<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterates the deduplicated union of members across several tags, per
/// `tag.forEach(tags, cb)` in §6.
pub fn for_each_across<T: 'static>(tags: &[&Tag<T>], mut cb: impl FnMut(&Rc<dyn TagMember<T>>)) {
    let mut seen: HashSet<SignalId> = HashSet::new();
    for tag in tags {
        for member in tag.signals() {
            if seen.insert(member.id()) {
                cb(&member);
            }
        }
    }
}

pub fn tag<T: 'static>() -> Tag<T> {
    Tag::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake(SignalId, i32);
    impl TagMember<i32> for Fake {
        fn id(&self) -> SignalId {
            self.0
        }
        fn peek(&self) -> i32 {
            self.1
        }
    }

    #[test]
    fn membership_tracks_liveness() {
        let t: Tag<i32> = tag();
        let id = rxblox_runtime::register();
        let member: Rc<dyn TagMember<i32>> = Rc::new(Fake(id, 42));
        t.add(&member);
        assert!(t.has(id));
        assert_eq!(t.size(), 1);
        drop(member);
        assert!(!t.has(id));
        assert_eq!(t.size(), 0);
    }
}
