//! The adjacency maps and per-node bookkeeping the engine walks during flush.
//!
//! Kept separate from `lib.rs` so the `thread_local!` wiring and the pure
//! graph algorithms (which are easy to unit test in isolation) don't have to
//! share one file.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::stale::StaleQueue;
use crate::SignalId;

/// Token returned by [`crate::add_listener`], opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Node {
    /// Signals that read `self` during their last recompute.
    dependents: HashSet<SignalId>,
    /// Signals `self` read during its last recompute.
    deps: HashSet<SignalId>,
    /// Scratch set accumulated by `record_touch` while `self` is being
    /// recomputed; swapped into `deps` by `commit_touches`.
    touching: HashSet<SignalId>,
    listeners: Vec<(ListenerId, Rc<dyn Fn()>)>,
    refresh: Option<Rc<dyn Fn() -> bool>>,
    stale: bool,
}

#[derive(Default)]
pub struct Graph {
    nodes: HashMap<SignalId, Node>,
    next_listener_id: u64,
}

impl Graph {
    pub fn insert(&mut self, id: SignalId) {
        self.nodes.insert(id, Node::default());
    }

    pub fn record_touch(&mut self, reader: SignalId, dep: SignalId) {
        if let Some(node) = self.nodes.get_mut(&reader) {
            node.touching.insert(dep);
        }
        if let Some(dep_node) = self.nodes.get_mut(&dep) {
            dep_node.dependents.insert(reader);
        }
    }

    /// Finalizes `id`'s dependency set after a recompute: anything touched
    /// this round but not last round gets a fresh `dependents` edge;
    /// anything in last round but not touched this round gets detached.
    pub fn commit_touches(&mut self, id: SignalId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let touched = std::mem::take(&mut node.touching);
        let stale_deps: Vec<SignalId> = node.deps.difference(&touched).copied().collect();
        node.deps = touched;
        for dep in stale_deps {
            if let Some(dep_node) = self.nodes.get_mut(&dep) {
                dep_node.dependents.remove(&id);
            }
        }
    }

    pub fn is_stale(&self, id: SignalId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.stale)
    }

    pub fn clear_stale(&mut self, id: SignalId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.stale = false;
        }
    }

    pub fn force_stale(&mut self, id: SignalId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.stale = true;
        }
    }

    pub fn set_refresh(&mut self, id: SignalId, refresh: Option<Rc<dyn Fn() -> bool>>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.refresh = refresh;
        }
    }

    pub fn add_listener(&mut self, id: SignalId, listener: Rc<dyn Fn()>) -> ListenerId {
        self.next_listener_id += 1;
        let token = ListenerId(self.next_listener_id);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.listeners.push((token, listener));
        }
        token
    }

    pub fn remove_listener(&mut self, id: SignalId, token: ListenerId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.listeners.retain(|(t, _)| *t != token);
        }
    }

    pub fn deps_of(&self, id: SignalId) -> HashSet<SignalId> {
        self.nodes.get(&id).map(|n| n.deps.clone()).unwrap_or_default()
    }

    /// Removes `id` from the graph entirely: detaches it from every
    /// dependency's `dependents` set and every dependent's `deps` set.
    pub fn dispose(&mut self, id: SignalId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for dep in &node.deps {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.dependents.remove(&id);
            }
        }
        for dependent in &node.dependents {
            if let Some(dependent_node) = self.nodes.get_mut(dependent) {
                dependent_node.deps.remove(&id);
            }
        }
    }

    pub fn listeners_and_refresh(
        &self,
        id: SignalId,
    ) -> (Vec<Rc<dyn Fn()>>, Option<Rc<dyn Fn() -> bool>>) {
        match self.nodes.get(&id) {
            Some(node) => (
                node.listeners.iter().map(|(_, cb)| cb.clone()).collect(),
                node.refresh.clone(),
            ),
            None => (Vec::new(), None),
        }
    }

    /// Breadth-first marks every node transitively reachable (via
    /// `dependents`) from `roots` as stale, and returns the set in the order
    /// each node was first discovered — `roots` themselves lead the list.
    ///
    /// This is the "walk dependents transitively, marking each stale" step
    /// of the batch-flush algorithm; it never calls a recompute/refresh
    /// callback itself, so it's safe to run even for nodes nobody observes.
    pub fn mark_stale_transitively(&mut self, roots: &[SignalId]) -> Vec<SignalId> {
        let mut queue: StaleQueue<SignalId> = StaleQueue::new();
        for &root in roots {
            queue.push(root);
        }

        while let Some(id) = queue.pop() {
            let dependents: Vec<SignalId> = match self.nodes.get(&id) {
                Some(node) => node.dependents.iter().copied().collect(),
                None => continue,
            };
            for dep in dependents {
                if queue.push(dep) {
                    if let Some(node) = self.nodes.get_mut(&dep) {
                        node.stale = true;
                    }
                }
            }
        }

        queue.into_order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_touches_detaches_dropped_dependency() {
        let mut g = Graph::default();
        let a = SignalId::fresh();
        let b = SignalId::fresh();
        let c = SignalId::fresh();
        g.insert(a);
        g.insert(b);
        g.insert(c);

        g.record_touch(c, a);
        g.commit_touches(c);
        assert!(g.deps_of(c).contains(&a));

        g.record_touch(c, b);
        g.commit_touches(c);
        assert!(!g.deps_of(c).contains(&a));
        assert!(g.deps_of(c).contains(&b));
    }

    #[test]
    fn mark_stale_transitively_visits_each_node_once() {
        let mut g = Graph::default();
        let a = SignalId::fresh();
        let b = SignalId::fresh();
        let c = SignalId::fresh();
        g.insert(a);
        g.insert(b);
        g.insert(c);
        g.record_touch(b, a);
        g.commit_touches(b);
        g.record_touch(c, a);
        g.commit_touches(c);

        let order = g.mark_stale_transitively(&[a]);
        assert_eq!(order.len(), 3);
        assert!(g.is_stale(b));
        assert!(g.is_stale(c));
    }
}
