//! Dependency graph
//!
//! A derived index over the registry store. Forward edges record what each
//! published version declares; reverse edges let impact analysis find every
//! version that depends on a module. Edges are kept acyclic at the
//! `namespace/name` level; a module may depend on another version of itself
//! as long as the range excludes its own version.

use crate::error::RegistryError;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use vmog_types::{ModuleKey, ModuleRef, VMogRegistryEntry};

/// Dependency edges of every published version.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    forward: BTreeMap<ModuleRef, BTreeMap<ModuleKey, VersionReq>>,
    reverse: BTreeMap<ModuleKey, BTreeSet<ModuleRef>>,
}

/// One node of a dependents tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentsNode {
    pub module: ModuleRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<DependentsNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from catalog records.
    pub fn rebuild<'a>(
        entries: impl IntoIterator<Item = &'a VMogRegistryEntry>,
    ) -> Result<Self, RegistryError> {
        let mut graph = Self::new();
        for entry in entries {
            let deps = entry.module.parsed_dependencies()?;
            graph.insert(entry.module_ref(), deps);
        }
        Ok(graph)
    }

    /// Record the dependencies of a published version, replacing any
    /// previously recorded edges for it.
    pub fn insert(&mut self, module: ModuleRef, dependencies: BTreeMap<ModuleKey, VersionReq>) {
        self.remove(&module);
        for dep in dependencies.keys() {
            self.reverse
                .entry(dep.clone())
                .or_default()
                .insert(module.clone());
        }
        self.forward.insert(module, dependencies);
    }

    /// Drop a version and its outgoing edges.
    pub fn remove(&mut self, module: &ModuleRef) {
        if let Some(old) = self.forward.remove(module) {
            for dep in old.keys() {
                if let Some(set) = self.reverse.get_mut(dep) {
                    set.remove(module);
                    if set.is_empty() {
                        self.reverse.remove(dep);
                    }
                }
            }
        }
    }

    /// Reject edges from `from` that would close a cycle between modules.
    pub fn check_acyclic<'a>(
        &self,
        from: &ModuleKey,
        dependencies: impl IntoIterator<Item = &'a ModuleKey>,
    ) -> Result<(), RegistryError> {
        for dep in dependencies {
            if dep == from {
                continue;
            }
            if let Some(mut path) = self.key_path(dep, from) {
                path.insert(0, from.clone());
                return Err(RegistryError::CyclicDependency { path });
            }
        }
        Ok(())
    }

    /// Module-level path from `start` to `goal`, if one exists.
    fn key_path(&self, start: &ModuleKey, goal: &ModuleKey) -> Option<Vec<ModuleKey>> {
        let mut parents: BTreeMap<ModuleKey, ModuleKey> = BTreeMap::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        visited.insert(start.clone());

        while let Some(current) = queue.pop_front() {
            if &current == goal {
                let mut path = vec![current.clone()];
                let mut cursor = current;
                while let Some(prev) = parents.get(&cursor) {
                    path.push(prev.clone());
                    cursor = prev.clone();
                }
                path.reverse();
                return Some(path);
            }
            for next in self.key_edges(&current) {
                if visited.insert(next.clone()) {
                    parents.insert(next.clone(), current.clone());
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Modules any version of `key` depends on, excluding itself.
    fn key_edges(&self, key: &ModuleKey) -> BTreeSet<ModuleKey> {
        self.forward
            .iter()
            .filter(|(r, _)| r.namespace == key.namespace && r.name == key.name)
            .flat_map(|(_, deps)| deps.keys().cloned())
            .filter(|dep| dep != key)
            .collect()
    }

    /// Versions depending on `key`. With a version, only dependents whose
    /// declared range admits it.
    pub fn dependents_of(&self, key: &ModuleKey, version: Option<&Version>) -> BTreeSet<ModuleRef> {
        let Some(candidates) = self.reverse.get(key) else {
            return BTreeSet::new();
        };
        candidates
            .iter()
            .filter(|dependent| match version {
                None => true,
                Some(v) => self
                    .requirement(dependent, key)
                    .is_some_and(|req| req.matches(v)),
            })
            .cloned()
            .collect()
    }

    /// Range `dependent` declares on `on`.
    pub fn requirement(&self, dependent: &ModuleRef, on: &ModuleKey) -> Option<&VersionReq> {
        self.forward.get(dependent).and_then(|deps| deps.get(on))
    }

    /// Transitive dependents of `key@version`, breadth first.
    pub fn impact_of(&self, key: &ModuleKey, version: &Version) -> Vec<ModuleRef> {
        let origin = key.at(version.clone());
        let mut seen = BTreeSet::from([origin.clone()]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([origin]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents_of(&current.key(), Some(&current.version)) {
                if seen.insert(dependent.clone()) {
                    order.push(dependent.clone());
                    queue.push_back(dependent);
                }
            }
        }
        order
    }

    /// Transitive dependents of `key@version` as a tree.
    pub fn dependents_tree(&self, key: &ModuleKey, version: &Version) -> DependentsNode {
        let root = key.at(version.clone());
        let mut path = BTreeSet::new();
        self.subtree(root, &mut path)
    }

    fn subtree(&self, module: ModuleRef, path: &mut BTreeSet<ModuleRef>) -> DependentsNode {
        path.insert(module.clone());
        let children: Vec<ModuleRef> = self
            .dependents_of(&module.key(), Some(&module.version))
            .into_iter()
            .filter(|d| !path.contains(d))
            .collect();
        let dependents = children
            .into_iter()
            .map(|d| self.subtree(d, path))
            .collect();
        path.remove(&module);
        DependentsNode { module, dependents }
    }

    /// Number of recorded versions.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeMap::len).sum()
    }
}
