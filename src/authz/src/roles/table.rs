//! Relation key to role manager table

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::manager::{DefaultRoleManager, RoleManager};
use crate::cel::{RelationFn, RelationMap};

/// Role manager shared between the enforcer and its generated `g*` functions
pub type SharedRoleManager = Arc<RwLock<Box<dyn RoleManager>>>;

/// One role manager per `g*` relation of the model
///
/// Built once per model load and turned into the [`RelationMap`] registered
/// into every matcher evaluation.
pub struct RoleLinkTable {
    max_hierarchy_level: usize,
    managers: BTreeMap<String, SharedRoleManager>,
}

impl RoleLinkTable {
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            max_hierarchy_level,
            managers: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<SharedRoleManager> {
        self.managers.get(key).cloned()
    }

    /// Manager for `key`, creating a [`DefaultRoleManager`] if none exists
    pub fn manager_or_default(&mut self, key: &str) -> SharedRoleManager {
        let max_level = self.max_hierarchy_level;
        self.managers
            .entry(key.to_string())
            .or_insert_with(|| {
                let manager: Box<dyn RoleManager> = Box::new(DefaultRoleManager::new(max_level));
                Arc::new(RwLock::new(manager))
            })
            .clone()
    }

    /// Register (or replace) the manager for `key`
    pub fn insert(&mut self, key: impl Into<String>, manager: Box<dyn RoleManager>) {
        self.managers.insert(key.into(), Arc::new(RwLock::new(manager)));
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.managers.keys()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Drop every link of every manager
    pub fn clear(&self) {
        for manager in self.managers.values() {
            manager.write().clear();
        }
    }

    /// Table of empty managers carrying the same configuration
    ///
    /// Reloads fill the fresh table off to the side and then swap it in, so
    /// in-flight evaluations keep seeing the previous graph.
    pub fn fresh(&self) -> Self {
        Self {
            max_hierarchy_level: self.max_hierarchy_level,
            managers: self
                .managers
                .iter()
                .map(|(key, manager)| (key.clone(), Arc::new(RwLock::new(manager.read().new_empty()))))
                .collect(),
        }
    }

    /// Reachability predicate per relation, for matcher evaluation
    pub fn relations(&self) -> RelationMap {
        self.managers
            .iter()
            .map(|(key, manager)| {
                let manager = Arc::clone(manager);
                let relation: RelationFn = Arc::new(move |name1: &str, name2: &str, domain: Option<&str>| -> crate::cel::Result<bool> {
                    Ok(manager.read().has_link(name1, name2, domain.unwrap_or("")))
                });
                (key.clone(), relation)
            })
            .collect()
    }
}

impl Default for RoleLinkTable {
    fn default() -> Self {
        Self::new(super::types::DEFAULT_MAX_HIERARCHY_LEVEL)
    }
}

impl fmt::Debug for RoleLinkTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleLinkTable")
            .field("max_hierarchy_level", &self.max_hierarchy_level)
            .field("relations", &self.managers.keys().collect::<Vec<_>>())
            .finish()
    }
}
