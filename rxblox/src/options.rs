//! The options record recognized by signal constructors (§6).

use std::rc::Rc;

use crate::equality::Equality;
use crate::tag::Tag;

/// Options accepted by [`crate::signal::Mutable::new_with`],
/// [`crate::signal::Computed::new_with`], and friends.
///
/// Builder-style: `SignalOptions::new().name("count").equals(Equality::Strict)`.
pub struct SignalOptions<T> {
    pub(crate) name: Option<String>,
    pub(crate) equals: Equality<T>,
    pub(crate) on_change: Option<Rc<dyn Fn(&T)>>,
    pub(crate) tags: Vec<Tag<T>>,
    pub(crate) initial_value: Option<T>,
}

impl<T> SignalOptions<T> {
    pub fn new() -> Self {
        Self {
            name: None,
            equals: Equality::default(),
            on_change: None,
            tags: Vec::new(),
            initial_value: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn equals(mut self, equals: Equality<T>) -> Self {
        self.equals = equals;
        self
    }

    pub fn on_change(mut self, on_change: impl Fn(&T) + 'static) -> Self {
        self.on_change = Some(Rc::new(on_change));
        self
    }

    pub fn tag(mut self, tag: Tag<T>) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = Tag<T>>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Overrides what `reset()` restores (mutable signals only, §6:
    /// "override for reset semantics"). Defaults to the constructor's
    /// starting value when unset.
    pub fn initial_value(mut self, initial_value: T) -> Self {
        self.initial_value = Some(initial_value);
        self
    }
}

impl<T> Default for SignalOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}
