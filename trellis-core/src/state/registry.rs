//! Weak Association Store
//!
//! Per-target bookkeeping kept on the side: the cached wrapper and the
//! parent linkage. Nothing in here is held strongly, so the registry never
//! keeps a target (or its wrapper) alive. Entries for dropped targets linger
//! until [`Registry::sweep`] evicts them.

use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use super::key::PropKey;
use super::value::{Target, TargetId, TargetInner};
use super::wrapper::WrapperInner;

/// Back-reference from a nested target to the property it was reached through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linkage {
    pub parent: TargetId,
    pub key: PropKey,
}

struct Entry {
    target: Weak<TargetInner>,
    wrapper: Weak<WrapperInner>,
    parent: Option<Linkage>,
}

#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<TargetId, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live wrapper for `id`, if one exists.
    pub fn cached_wrapper(&self, id: TargetId) -> Option<Rc<WrapperInner>> {
        self.entries.get(&id).and_then(|e| e.wrapper.upgrade())
    }

    /// Remember `wrapper` as the wrapper of `target`.
    pub fn cache_wrapper(&mut self, target: &Target, wrapper: &Rc<WrapperInner>) {
        let entry = self.entries.entry(target.id()).or_insert_with(|| Entry {
            target: target.downgrade(),
            wrapper: Weak::new(),
            parent: None,
        });
        entry.wrapper = Rc::downgrade(wrapper);
    }

    pub fn parent(&self, id: TargetId) -> Option<&Linkage> {
        self.entries.get(&id).and_then(|e| e.parent.as_ref())
    }

    /// Record that `child` was reached through `parent.key`.
    ///
    /// The latest path wins. A linkage that would make `child` its own
    /// ancestor is refused and `false` is returned, so linkage chains stay
    /// acyclic.
    pub fn link(&mut self, child: TargetId, parent: TargetId, key: PropKey) -> bool {
        if self.is_ancestor_or_self(child, parent) {
            return false;
        }
        match self.entries.get_mut(&child) {
            Some(entry) => {
                entry.parent = Some(Linkage { parent, key });
                true
            }
            None => false,
        }
    }

    /// Walk up from `start` looking for `candidate`.
    fn is_ancestor_or_self(&self, candidate: TargetId, start: TargetId) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            if !visited.insert(id) {
                break;
            }
            cursor = self.parent(id).map(|link| link.parent);
        }
        false
    }

    /// Evict entries whose target has been dropped, returning their ids.
    ///
    /// Linkages pointing at an evicted parent are cleared as well.
    pub fn sweep(&mut self) -> Vec<TargetId> {
        let dead: Vec<TargetId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.target.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();

        for id in &dead {
            self.entries.remove(id);
        }
        if !dead.is_empty() {
            for entry in self.entries.values_mut() {
                if entry
                    .parent
                    .as_ref()
                    .is_some_and(|link| dead.contains(&link.parent))
                {
                    entry.parent = None;
                }
            }
        }
        dead
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
