//! Dependency Edges
//!
//! Every edge `(target, key) -> subscriber` lives in two mirrored indexes:
//!
//! - forward: `(target, key)` to the subscribers that read it, in the order
//!   they first subscribed
//! - reverse: subscriber to every `(target, key)` it currently reads
//!
//! Both are only ever updated together, so an edge is in one iff it is in the
//! other. Clearing a subscriber costs O(its own edges).

use std::collections::HashMap;

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::reactive::SubscriberId;
use crate::state::{PropKey, TargetId};

/// One readable property: the source side of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub target: TargetId,
    pub key: PropKey,
}

impl Dependency {
    pub fn new(target: TargetId, key: PropKey) -> Self {
        Self { target, key }
    }
}

/// Subscribers collected for one trigger; most properties have a handful.
pub type Subscribers = SmallVec<[SubscriberId; 4]>;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    forward: HashMap<Dependency, IndexSet<SubscriberId>>,
    reverse: HashMap<SubscriberId, IndexSet<Dependency>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `subscriber` reads `dependency`.
    ///
    /// Returns `false` if the edge already existed.
    pub fn add_edge(&mut self, dependency: Dependency, subscriber: SubscriberId) -> bool {
        let inserted = self
            .forward
            .entry(dependency.clone())
            .or_default()
            .insert(subscriber);
        if inserted {
            self.reverse
                .entry(subscriber)
                .or_default()
                .insert(dependency);
        }
        inserted
    }

    /// Subscribers of `dependency`, in subscription order.
    pub fn subscribers_of(&self, dependency: &Dependency) -> Subscribers {
        self.forward
            .get(dependency)
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove every edge of `subscriber` from both indexes.
    ///
    /// Returns the number of edges removed.
    pub fn clear_edges(&mut self, subscriber: SubscriberId) -> usize {
        let Some(dependencies) = self.reverse.remove(&subscriber) else {
            return 0;
        };
        for dependency in &dependencies {
            if let Some(subs) = self.forward.get_mut(dependency) {
                subs.shift_remove(&subscriber);
                if subs.is_empty() {
                    self.forward.remove(dependency);
                }
            }
        }
        dependencies.len()
    }

    /// Remove every edge whose source is `target`.
    pub fn remove_target(&mut self, target: TargetId) -> usize {
        let doomed: Vec<Dependency> = self
            .forward
            .keys()
            .filter(|dep| dep.target == target)
            .cloned()
            .collect();

        let mut removed = 0;
        for dependency in doomed {
            let Some(subs) = self.forward.remove(&dependency) else {
                continue;
            };
            for subscriber in subs {
                removed += 1;
                if let Some(deps) = self.reverse.get_mut(&subscriber) {
                    deps.shift_remove(&dependency);
                    if deps.is_empty() {
                        self.reverse.remove(&subscriber);
                    }
                }
            }
        }
        removed
    }

    pub fn subscriber_count(&self, dependency: &Dependency) -> usize {
        self.forward.get(dependency).map_or(0, IndexSet::len)
    }

    pub fn dependency_count(&self, subscriber: SubscriberId) -> usize {
        self.reverse.get(&subscriber).map_or(0, IndexSet::len)
    }

    pub fn edge_count(&self) -> usize {
        self.reverse.values().map(IndexSet::len).sum()
    }

    /// Whether the two indexes mirror each other exactly.
    pub fn is_consistent(&self) -> bool {
        let forward_edges: usize = self.forward.values().map(IndexSet::len).sum();
        forward_edges == self.edge_count()
            && self.reverse.iter().all(|(sub, deps)| {
                deps.iter().all(|dep| {
                    self.forward
                        .get(dep)
                        .is_some_and(|subs| subs.contains(sub))
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::state::Target;

    fn dep(target: &Target, key: &str) -> Dependency {
        Dependency::new(target.id(), key.into())
    }

    #[test]
    fn add_edge_updates_both_indexes() {
        let mut graph = DependencyGraph::new();
        let a = dep(&Target::record::<&str, _>([]), "a");
        let sub = SubscriberId::new();

        assert!(graph.add_edge(a.clone(), sub));
        assert!(!graph.add_edge(a.clone(), sub));

        assert_eq!(graph.subscriber_count(&a), 1);
        assert_eq!(graph.dependency_count(sub), 1);
        assert!(graph.is_consistent());
    }

    #[test]
    fn subscribers_keep_insertion_order() {
        let mut graph = DependencyGraph::new();
        let a = dep(&Target::record::<&str, _>([]), "a");
        let ids: Vec<SubscriberId> = (0..5).map(|_| SubscriberId::new()).collect();
        for id in ids.iter().rev() {
            graph.add_edge(a.clone(), *id);
        }

        let expected: Vec<SubscriberId> = ids.iter().rev().copied().collect();
        assert_eq!(graph.subscribers_of(&a).to_vec(), expected);
    }

    #[test]
    fn clear_edges_removes_subscriber_everywhere() {
        let mut graph = DependencyGraph::new();
        let target = Target::record::<&str, _>([]);
        let (a, b) = (dep(&target, "a"), dep(&target, "b"));
        let (s1, s2) = (SubscriberId::new(), SubscriberId::new());

        graph.add_edge(a.clone(), s1);
        graph.add_edge(b.clone(), s1);
        graph.add_edge(a.clone(), s2);

        assert_eq!(graph.clear_edges(s1), 2);
        assert!(!graph.subscribers_of(&a).contains(&s1));
        assert!(graph.subscribers_of(&b).is_empty());
        assert_eq!(graph.subscribers_of(&a).to_vec(), vec![s2]);
        assert_eq!(graph.dependency_count(s1), 0);
        assert!(graph.is_consistent());

        assert_eq!(graph.clear_edges(s1), 0);
    }

    #[test]
    fn remove_target_drops_only_that_targets_edges() {
        let mut graph = DependencyGraph::new();
        let t1 = Target::sequence(Vec::new());
        let t2 = Target::sequence(Vec::new());
        let sub = SubscriberId::new();

        graph.add_edge(Dependency::new(t1.id(), PropKey::Length), sub);
        graph.add_edge(Dependency::new(t1.id(), PropKey::Index(0)), sub);
        graph.add_edge(Dependency::new(t2.id(), PropKey::Length), sub);

        assert_eq!(graph.remove_target(t1.id()), 2);
        assert_eq!(graph.dependency_count(sub), 1);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.is_consistent());
    }
}
