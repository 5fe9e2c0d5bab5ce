//! Role manager: domain-scoped inheritance graph with bounded reachability
//!
//! Edges are stored per domain as `child -> {parents}`. Reachability is a
//! breadth-first search bounded by `max_hierarchy_level` hops and guarded by
//! a visited set, so accidentally cyclic inputs still terminate.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use super::types::{MatchingFn, DEFAULT_MAX_HIERARCHY_LEVEL};

/// Role inheritance graph used by the generated `g*` matcher functions
pub trait RoleManager: Send + Sync {
    /// Add edge `name1 -> name2` in `domain` (`""` for none); idempotent
    fn add_link(&mut self, name1: &str, name2: &str, domain: &str);

    /// Remove edge `name1 -> name2` in `domain`; no-op if absent
    fn delete_link(&mut self, name1: &str, name2: &str, domain: &str);

    /// Whether `name2` is reachable from `name1` within `domain`
    fn has_link(&self, name1: &str, name2: &str, domain: &str) -> bool;

    /// Direct parents of `name` in `domain`
    fn get_roles(&self, name: &str, domain: &str) -> Vec<String>;

    /// Direct children of `name` in `domain`
    fn get_users(&self, name: &str, domain: &str) -> Vec<String>;

    /// Drop every edge
    fn clear(&mut self);

    /// Install (or remove, with `None`) the node-equality predicate
    fn set_matching_fn(&mut self, matching_fn: Option<MatchingFn>);

    /// Empty manager with the same configuration, used when policy reloads
    fn new_empty(&self) -> Box<dyn RoleManager>;
}

/// Default in-memory role manager
#[derive(Clone)]
pub struct DefaultRoleManager {
    /// domain -> child -> parents
    links: HashMap<String, HashMap<String, BTreeSet<String>>>,

    /// Maximum number of hops followed by `has_link`
    max_hierarchy_level: usize,

    /// Optional pattern equality; exact string equality when unset
    matching_fn: Option<MatchingFn>,
}

impl DefaultRoleManager {
    /// Create an empty manager bounded to `max_hierarchy_level` hops
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            links: HashMap::new(),
            max_hierarchy_level,
            matching_fn: None,
        }
    }

    /// Builder-style matching function
    pub fn with_matching_fn(mut self, matching_fn: MatchingFn) -> Self {
        self.matching_fn = Some(matching_fn);
        self
    }

    pub fn max_hierarchy_level(&self) -> usize {
        self.max_hierarchy_level
    }

    /// Number of edges across every domain
    pub fn link_count(&self) -> usize {
        self.links
            .values()
            .flat_map(|children| children.values())
            .map(BTreeSet::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.link_count() == 0
    }

    /// `name == pattern`, or the matching function accepts it
    fn matches(&self, name: &str, pattern: &str) -> bool {
        name == pattern || self.matching_fn.as_ref().map_or(false, |f| f(name, pattern))
    }

    /// Parents of every stored child that `name` matches
    fn parents_of<'a>(&'a self, name: &'a str, domain: &str) -> Vec<&'a String> {
        let Some(children) = self.links.get(domain) else {
            return Vec::new();
        };

        if self.matching_fn.is_none() {
            return children
                .get(name)
                .map(|parents| parents.iter().collect())
                .unwrap_or_default();
        }

        children
            .iter()
            .filter(|(child, _)| self.matches(name, child))
            .flat_map(|(_, parents)| parents.iter())
            .collect()
    }
}

impl Default for DefaultRoleManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HIERARCHY_LEVEL)
    }
}

impl fmt::Debug for DefaultRoleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultRoleManager")
            .field("links", &self.links)
            .field("max_hierarchy_level", &self.max_hierarchy_level)
            .field("has_matching_fn", &self.matching_fn.is_some())
            .finish()
    }
}

impl RoleManager for DefaultRoleManager {
    fn add_link(&mut self, name1: &str, name2: &str, domain: &str) {
        self.links
            .entry(domain.to_string())
            .or_default()
            .entry(name1.to_string())
            .or_default()
            .insert(name2.to_string());
    }

    fn delete_link(&mut self, name1: &str, name2: &str, domain: &str) {
        let Some(children) = self.links.get_mut(domain) else {
            return;
        };
        if let Some(parents) = children.get_mut(name1) {
            parents.remove(name2);
            if parents.is_empty() {
                children.remove(name1);
            }
        }
        if children.is_empty() {
            self.links.remove(domain);
        }
    }

    fn has_link(&self, name1: &str, name2: &str, domain: &str) -> bool {
        if self.matches(name1, name2) {
            return true;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        visited.insert(name1);
        queue.push_back((name1, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_hierarchy_level {
                continue;
            }
            for parent in self.parents_of(current, domain) {
                if self.matches(name2, parent) || self.matches(parent, name2) {
                    return true;
                }
                if visited.insert(parent.as_str()) {
                    queue.push_back((parent.as_str(), depth + 1));
                }
            }
        }

        false
    }

    fn get_roles(&self, name: &str, domain: &str) -> Vec<String> {
        let roles: BTreeSet<String> = self
            .parents_of(name, domain)
            .into_iter()
            .cloned()
            .collect();
        roles.into_iter().collect()
    }

    fn get_users(&self, name: &str, domain: &str) -> Vec<String> {
        let Some(children) = self.links.get(domain) else {
            return Vec::new();
        };
        let users: BTreeSet<String> = children
            .iter()
            .filter(|(_, parents)| parents.iter().any(|p| self.matches(name, p)))
            .map(|(child, _)| child.clone())
            .collect();
        users.into_iter().collect()
    }

    fn clear(&mut self) {
        self.links.clear();
    }

    fn set_matching_fn(&mut self, matching_fn: Option<MatchingFn>) {
        self.matching_fn = matching_fn;
    }

    fn new_empty(&self) -> Box<dyn RoleManager> {
        Box::new(Self {
            links: HashMap::new(),
            max_hierarchy_level: self.max_hierarchy_level,
            matching_fn: self.matching_fn.clone(),
        })
    }
}
