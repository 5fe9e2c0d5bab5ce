//! Policy management and RBAC queries

use tracing::debug;

use super::{Enforcer, EnforcerState};
use crate::error::{AuthzError, Result};
use crate::model::PolicyOp;
use crate::watcher::PolicyChange;

impl Enforcer {
    // ========================================================================
    // Internal writers
    // ========================================================================

    async fn add_policies_internal(&self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        {
            let state = self.state.read();
            if state.model.assertion(sec, ptype).is_none() {
                return Err(AuthzError::InvalidModel(format!(
                    "policy type '{}' is not defined by the model",
                    ptype
                )));
            }
            if rules.iter().any(|rule| state.model.has_policy(sec, ptype, rule)) {
                return Ok(false);
            }
        }

        if self.config.auto_save {
            self.adapter.lock().await.add_policies(sec, ptype, &rules).await?;
        }

        {
            let mut state = self.state.write();
            if !state.model.add_policies(sec, ptype, rules.clone()) {
                return Ok(false);
            }
            if sec == "p" {
                state.model.sort_policies_by_priority()?;
            }
            self.sync_role_links(&mut state, sec, ptype, PolicyOp::Add, &rules)?;
        }

        debug!(sec, ptype, count = rules.len(), "Policies added");
        self.notify_change(PolicyChange::AddPolicies {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            rules,
        });
        Ok(true)
    }

    async fn remove_policies_internal(&self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        {
            let state = self.state.read();
            if !rules.iter().all(|rule| state.model.has_policy(sec, ptype, rule)) {
                return Ok(false);
            }
        }

        if self.config.auto_save {
            self.adapter.lock().await.remove_policies(sec, ptype, &rules).await?;
        }

        {
            let mut state = self.state.write();
            let mut removed = Vec::with_capacity(rules.len());
            for rule in &rules {
                if state.model.remove_policy(sec, ptype, rule) {
                    removed.push(rule.clone());
                }
            }
            if removed.is_empty() {
                return Ok(false);
            }
            self.sync_role_links(&mut state, sec, ptype, PolicyOp::Remove, &removed)?;
            self.reset_caches(&state);
        }

        debug!(sec, ptype, count = rules.len(), "Policies removed");
        self.notify_change(PolicyChange::RemovePolicies {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            rules,
        });
        Ok(true)
    }

    async fn remove_filtered_policy_internal(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        if self.config.auto_save {
            self.adapter
                .lock()
                .await
                .remove_filtered_policy(sec, ptype, field_index, &field_values)
                .await?;
        }

        {
            let mut state = self.state.write();
            let removed = state
                .model
                .remove_filtered_policy(sec, ptype, field_index, &field_values);
            if removed.is_empty() {
                return Ok(false);
            }
            self.sync_role_links(&mut state, sec, ptype, PolicyOp::Remove, &removed)?;
            self.reset_caches(&state);
        }

        self.notify_change(PolicyChange::RemoveFilteredPolicy {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            field_index,
            field_values,
        });
        Ok(true)
    }

    fn sync_role_links(
        &self,
        state: &mut EnforcerState,
        sec: &str,
        ptype: &str,
        op: PolicyOp,
        rules: &[Vec<String>],
    ) -> Result<()> {
        if sec != "g" || !self.config.auto_build_role_links {
            return Ok(());
        }
        let EnforcerState { model, role_links, .. } = state;
        let known = role_links.get(ptype).is_some();
        model.build_incremental_role_links(role_links, op, ptype, rules)?;
        if !known {
            state.relations = state.role_links.relations();
        }
        Ok(())
    }

    fn notify_change(&self, change: PolicyChange) {
        if self.config.auto_notify_watcher {
            self.notify(&change);
        }
    }

    // ========================================================================
    // Policy rows
    // ========================================================================

    /// Add a `p` rule; `Ok(false)` if it already exists
    pub async fn add_policy(&self, rule: Vec<String>) -> Result<bool> {
        self.add_named_policy("p", rule).await
    }

    pub async fn add_named_policy(&self, ptype: &str, rule: Vec<String>) -> Result<bool> {
        self.add_policies_internal("p", ptype, vec![rule]).await
    }

    /// Add several `p` rules at once; nothing is added if any already exists
    pub async fn add_policies(&self, rules: Vec<Vec<String>>) -> Result<bool> {
        self.add_named_policies("p", rules).await
    }

    pub async fn add_named_policies(&self, ptype: &str, rules: Vec<Vec<String>>) -> Result<bool> {
        self.add_policies_internal("p", ptype, rules).await
    }

    /// Remove a `p` rule; `Ok(false)` if it was not present
    pub async fn remove_policy(&self, rule: Vec<String>) -> Result<bool> {
        self.remove_named_policy("p", rule).await
    }

    pub async fn remove_named_policy(&self, ptype: &str, rule: Vec<String>) -> Result<bool> {
        self.remove_policies_internal("p", ptype, vec![rule]).await
    }

    pub async fn remove_policies(&self, rules: Vec<Vec<String>>) -> Result<bool> {
        self.remove_policies_internal("p", "p", rules).await
    }

    /// Remove `p` rules matching `field_values` from `field_index` on
    pub async fn remove_filtered_policy(&self, field_index: usize, field_values: Vec<String>) -> Result<bool> {
        self.remove_filtered_policy_internal("p", "p", field_index, field_values).await
    }

    pub async fn remove_filtered_named_policy(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        self.remove_filtered_policy_internal("p", ptype, field_index, field_values).await
    }

    // ========================================================================
    // Grouping rows
    // ========================================================================

    /// Add a `g` rule (`user, role[, domain]`); role links follow
    pub async fn add_grouping_policy(&self, rule: Vec<String>) -> Result<bool> {
        self.add_named_grouping_policy("g", rule).await
    }

    pub async fn add_named_grouping_policy(&self, ptype: &str, rule: Vec<String>) -> Result<bool> {
        self.add_policies_internal("g", ptype, vec![rule]).await
    }

    pub async fn add_grouping_policies(&self, rules: Vec<Vec<String>>) -> Result<bool> {
        self.add_policies_internal("g", "g", rules).await
    }

    pub async fn remove_grouping_policy(&self, rule: Vec<String>) -> Result<bool> {
        self.remove_named_grouping_policy("g", rule).await
    }

    pub async fn remove_named_grouping_policy(&self, ptype: &str, rule: Vec<String>) -> Result<bool> {
        self.remove_policies_internal("g", ptype, vec![rule]).await
    }

    pub async fn remove_filtered_grouping_policy(
        &self,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        self.remove_filtered_policy_internal("g", "g", field_index, field_values).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_policy(&self) -> Vec<Vec<String>> {
        self.get_named_policy("p")
    }

    pub fn get_named_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.state.read().model.get_policy("p", ptype)
    }

    pub fn get_filtered_policy(&self, field_index: usize, field_values: &[String]) -> Vec<Vec<String>> {
        self.state
            .read()
            .model
            .get_filtered_policy("p", "p", field_index, field_values)
    }

    pub fn get_grouping_policy(&self) -> Vec<Vec<String>> {
        self.get_named_grouping_policy("g")
    }

    pub fn get_named_grouping_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.state.read().model.get_policy("g", ptype)
    }

    pub fn get_filtered_grouping_policy(&self, field_index: usize, field_values: &[String]) -> Vec<Vec<String>> {
        self.state
            .read()
            .model
            .get_filtered_policy("g", "g", field_index, field_values)
    }

    pub fn has_policy(&self, rule: &[String]) -> bool {
        self.has_named_policy("p", rule)
    }

    pub fn has_named_policy(&self, ptype: &str, rule: &[String]) -> bool {
        self.state.read().model.has_policy("p", ptype, rule)
    }

    pub fn has_grouping_policy(&self, rule: &[String]) -> bool {
        self.state.read().model.has_policy("g", "g", rule)
    }

    /// Distinct subjects (first `p` column)
    pub fn get_all_subjects(&self) -> Vec<String> {
        self.state.read().model.get_values_for_field("p", "p", 0)
    }

    /// Distinct roles (second `g` column)
    pub fn get_all_roles(&self) -> Vec<String> {
        self.state.read().model.get_values_for_field("g", "g", 1)
    }

    // ========================================================================
    // RBAC
    // ========================================================================

    /// Direct roles of `name` through relation `g`
    pub fn get_roles_for_user(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.get_role_manager("g")
            .map(|rm| rm.read().get_roles(name, domain.unwrap_or("")))
            .unwrap_or_default()
    }

    /// Direct members of `role` through relation `g`
    pub fn get_users_for_role(&self, role: &str, domain: Option<&str>) -> Vec<String> {
        self.get_role_manager("g")
            .map(|rm| rm.read().get_users(role, domain.unwrap_or("")))
            .unwrap_or_default()
    }

    /// Whether `name` inherits `role` (transitively) through relation `g`
    pub fn has_role_for_user(&self, name: &str, role: &str, domain: Option<&str>) -> bool {
        self.get_role_manager("g")
            .map_or(false, |rm| rm.read().has_link(name, role, domain.unwrap_or("")))
    }

    /// Grant `role` to `user` by adding a `g` rule
    pub async fn add_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
        self.add_grouping_policy(grouping_rule(user, role, domain)).await
    }

    /// Revoke `role` from `user` by removing the `g` rule
    pub async fn delete_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> Result<bool> {
        self.remove_grouping_policy(grouping_rule(user, role, domain)).await
    }

    /// Add an edge directly to relation `ptype`'s role manager
    ///
    /// The model and adapter are not touched; a reload drops the edge.
    pub fn add_link(&self, ptype: &str, name1: &str, name2: &str, domain: Option<&str>) {
        let mut state = self.state.write();
        let known = state.role_links.get(ptype).is_some();
        let manager = state.role_links.manager_or_default(ptype);
        manager.write().add_link(name1, name2, domain.unwrap_or(""));
        if !known {
            state.relations = state.role_links.relations();
        }
    }

    /// Remove an edge directly from relation `ptype`'s role manager
    pub fn delete_link(&self, ptype: &str, name1: &str, name2: &str, domain: Option<&str>) {
        let state = self.state.write();
        if let Some(manager) = state.role_links.get(ptype) {
            manager.write().delete_link(name1, name2, domain.unwrap_or(""));
        }
    }
}

fn grouping_rule(user: &str, role: &str, domain: Option<&str>) -> Vec<String> {
    let mut rule = vec![user.to_string(), role.to_string()];
    if let Some(domain) = domain {
        rule.push(domain.to_string());
    }
    rule
}
