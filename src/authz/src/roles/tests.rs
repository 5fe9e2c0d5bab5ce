//! Role manager tests: links, domains, depth bound, matching functions

use super::manager::{DefaultRoleManager, RoleManager};
use super::table::RoleLinkTable;
use super::types::{matching_fn_from_builtin, MatchingFn};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn manager_with(links: &[(&str, &str)]) -> DefaultRoleManager {
    let mut rm = DefaultRoleManager::new(10);
    for (child, parent) in links {
        rm.add_link(child, parent, "");
    }
    rm
}

// ============================================================================
// Link Lifecycle Tests
// ============================================================================

#[test]
fn test_empty_manager() {
    let rm = DefaultRoleManager::default();
    assert!(rm.is_empty());
    assert!(!rm.has_link("alice", "admin", ""));
    assert!(rm.has_link("alice", "alice", ""));
}

#[test]
fn test_add_link_is_idempotent() {
    let mut rm = manager_with(&[("alice", "admin")]);
    rm.add_link("alice", "admin", "");
    assert_eq!(rm.link_count(), 1);
    assert!(rm.has_link("alice", "admin", ""));
}

#[test]
fn test_transitive_link() {
    let rm = manager_with(&[("u1", "g1"), ("g1", "g2"), ("g2", "g3")]);

    assert!(rm.has_link("u1", "g3", ""));
    assert!(rm.has_link("g1", "g3", ""));
    assert!(!rm.has_link("g3", "u1", ""));
}

#[test]
fn test_delete_link() {
    let mut rm = manager_with(&[("u1", "g1"), ("g1", "g2")]);
    rm.delete_link("g1", "g2", "");

    assert!(rm.has_link("u1", "g1", ""));
    assert!(!rm.has_link("u1", "g2", ""));

    // absent edge
    rm.delete_link("nobody", "g2", "");
    assert_eq!(rm.link_count(), 1);
}

#[test]
fn test_delete_keeps_alternate_chain() {
    let mut rm = manager_with(&[("u1", "g1"), ("g1", "g3"), ("u1", "g2"), ("g2", "g3")]);
    rm.delete_link("g1", "g3", "");
    assert!(rm.has_link("u1", "g3", ""));

    rm.delete_link("g2", "g3", "");
    assert!(!rm.has_link("u1", "g3", ""));
}

#[test]
fn test_clear() {
    let mut rm = manager_with(&[("u1", "g1"), ("u2", "g1")]);
    rm.clear();

    assert!(rm.is_empty());
    assert!(!rm.has_link("u1", "g1", ""));
    assert!(rm.get_users("g1", "").is_empty());
}

#[test]
fn test_get_roles_and_users() {
    let rm = manager_with(&[("u1", "g1"), ("u1", "g2"), ("u2", "g1"), ("g1", "g3")]);

    assert_eq!(rm.get_roles("u1", ""), vec!["g1", "g2"]);
    assert_eq!(rm.get_users("g1", ""), vec!["u1", "u2"]);
    // one hop only
    assert_eq!(rm.get_roles("u2", ""), vec!["g1"]);
    assert!(rm.get_roles("nobody", "").is_empty());
}

// ============================================================================
// Domain Tests
// ============================================================================

#[test]
fn test_domains_are_isolated() {
    let mut rm = DefaultRoleManager::new(10);
    rm.add_link("alice", "admin", "domain1");
    rm.add_link("bob", "admin", "domain2");
    rm.add_link("admin", "superuser", "domain1");

    assert!(rm.has_link("alice", "admin", "domain1"));
    assert!(rm.has_link("alice", "superuser", "domain1"));
    assert!(!rm.has_link("alice", "admin", "domain2"));
    assert!(!rm.has_link("bob", "superuser", "domain2"));
    assert!(!rm.has_link("alice", "admin", ""));

    assert_eq!(rm.get_users("admin", "domain1"), vec!["alice"]);
    assert_eq!(rm.get_roles("bob", "domain2"), vec!["admin"]);
}

// ============================================================================
// Cycle And Depth Tests
// ============================================================================

#[test]
fn test_cycle_terminates() {
    let rm = manager_with(&[("a", "b"), ("b", "c"), ("c", "a")]);

    assert!(rm.has_link("a", "c", ""));
    assert!(!rm.has_link("a", "z", ""));
}

#[test]
fn test_depth_bound() {
    let mut rm = DefaultRoleManager::new(3);
    rm.add_link("n0", "n1", "");
    rm.add_link("n1", "n2", "");
    rm.add_link("n2", "n3", "");
    rm.add_link("n3", "n4", "");

    assert!(rm.has_link("n0", "n3", ""));
    // four hops exceed the bound: not reachable, not an error
    assert!(!rm.has_link("n0", "n4", ""));
    assert!(rm.has_link("n1", "n4", ""));
}

// ============================================================================
// Matching Function Tests
// ============================================================================

#[test]
fn test_pattern_resource_group() {
    let mut rm = DefaultRoleManager::new(10);
    rm.set_matching_fn(matching_fn_from_builtin("keyMatch"));
    rm.add_link("/book/*", "book_group", "");

    assert!(rm.has_link("/book/1", "book_group", ""));
    assert!(rm.has_link("/book/2/chapter", "book_group", ""));
    assert!(!rm.has_link("/pen/1", "book_group", ""));
    assert_eq!(rm.get_roles("/book/1", ""), vec!["book_group"]);
}

#[test]
fn test_pattern_applies_along_chain() {
    let mut rm = DefaultRoleManager::new(10);
    rm.set_matching_fn(matching_fn_from_builtin("keyMatch2"));
    rm.add_link("/book/:id", "books", "");
    rm.add_link("books", "catalog", "");

    assert!(rm.has_link("/book/42", "catalog", ""));
    assert!(!rm.has_link("/book/42/pages", "catalog", ""));
}

#[test]
fn test_custom_matching_fn() {
    let prefix: MatchingFn = Arc::new(|name: &str, pattern: &str| {
        pattern.strip_suffix('*').map_or(false, |p| name.starts_with(p))
    });
    let mut rm = DefaultRoleManager::new(10).with_matching_fn(prefix);
    rm.add_link("user:*", "member", "");

    assert!(rm.has_link("user:alice", "member", ""));
    assert!(!rm.has_link("svc:alice", "member", ""));

    rm.set_matching_fn(None);
    assert!(!rm.has_link("user:alice", "member", ""));
}

#[test]
fn test_new_empty_keeps_configuration() {
    let mut rm = DefaultRoleManager::new(2);
    rm.set_matching_fn(matching_fn_from_builtin("keyMatch"));
    rm.add_link("/a/*", "g", "");

    let mut fresh = rm.new_empty();
    assert!(!fresh.has_link("/a/1", "g", ""));

    fresh.add_link("/a/*", "g", "");
    assert!(fresh.has_link("/a/1", "g", ""));
}

// ============================================================================
// Link Table Tests
// ============================================================================

#[test]
fn test_table_relations() {
    let mut table = RoleLinkTable::new(10);
    table.manager_or_default("g").write().add_link("alice", "admin", "");
    table.manager_or_default("g2").write().add_link("bob", "writer", "t1");

    let relations = table.relations();
    assert_eq!(relations.len(), 2);

    let g = &relations["g"];
    assert!(g("alice", "admin", None).unwrap());
    assert!(!g("bob", "admin", None).unwrap());

    let g2 = &relations["g2"];
    assert!(g2("bob", "writer", Some("t1")).unwrap());
    assert!(!g2("bob", "writer", Some("t2")).unwrap());
}

#[test]
fn test_table_relations_see_later_links() {
    let mut table = RoleLinkTable::new(10);
    let manager = table.manager_or_default("g");
    let relations = table.relations();

    assert!(!relations["g"]("alice", "admin", None).unwrap());
    manager.write().add_link("alice", "admin", "");
    assert!(relations["g"]("alice", "admin", None).unwrap());
}

#[test]
fn test_table_fresh_and_clear() {
    let mut table = RoleLinkTable::new(10);
    table.manager_or_default("g").write().add_link("alice", "admin", "");

    let fresh = table.fresh();
    assert_eq!(fresh.len(), 1);
    assert!(!fresh.get("g").unwrap().read().has_link("alice", "admin", ""));
    assert!(table.get("g").unwrap().read().has_link("alice", "admin", ""));

    table.clear();
    assert!(!table.get("g").unwrap().read().has_link("alice", "admin", ""));
}

#[test]
fn test_table_insert_custom_manager() {
    let mut table = RoleLinkTable::default();
    let mut custom = DefaultRoleManager::new(1);
    custom.add_link("a", "b", "");
    table.insert("g", Box::new(custom));

    assert!(table.get("g").unwrap().read().has_link("a", "b", ""));
    assert!(table.get("g3").is_none());
}

// ============================================================================
// Property Tests
// ============================================================================

fn naive_reachable(edges: &[(u8, u8)], from: u8, to: u8) -> bool {
    if from == to {
        return true;
    }
    let mut adjacency: HashMap<u8, Vec<u8>> = HashMap::new();
    for (a, b) in edges {
        adjacency.entry(*a).or_default().push(*b);
    }
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        for next in adjacency.get(&node).into_iter().flatten() {
            if *next == to {
                return true;
            }
            if seen.insert(*next) {
                stack.push(*next);
            }
        }
    }
    false
}

proptest! {
    // node count stays below the hop bound, so bounded search equals closure
    #[test]
    fn prop_reachability_matches_closure(
        edges in prop::collection::vec((0u8..8, 0u8..8), 0..24),
        from in 0u8..8,
        to in 0u8..8,
    ) {
        let mut rm = DefaultRoleManager::new(10);
        for (a, b) in &edges {
            rm.add_link(&a.to_string(), &b.to_string(), "");
        }

        prop_assert_eq!(
            rm.has_link(&from.to_string(), &to.to_string(), ""),
            naive_reachable(&edges, from, to)
        );
    }

    #[test]
    fn prop_clear_removes_everything(
        edges in prop::collection::vec((0u8..8, 0u8..8), 1..16),
    ) {
        let mut rm = DefaultRoleManager::new(10);
        for (a, b) in &edges {
            rm.add_link(&a.to_string(), &b.to_string(), "");
        }
        rm.clear();

        for (a, b) in &edges {
            prop_assert_eq!(rm.has_link(&a.to_string(), &b.to_string(), ""), a == b);
        }
    }
}
