//! Enforcer: binds model, role managers, matcher engine and effector
//!
//! # Architecture
//!
//! ```text
//! request → r_* bindings → for each p row: p_* bindings → matcher (CEL + g*) → effect
//!                                                                                 ↓
//!                                                      Effector::merge_effects → decision
//! ```
//!
//! `enforce` takes a read guard over the model, role-link table and function
//! namespace; every writer takes the write guard. Reloads build the new model
//! and role graph off to the side and swap them in, so no lock is held while
//! the adapter is awaited.

mod management;

use parking_lot::RwLock;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, FileAdapter, Filter, MemoryAdapter};
use crate::cel::matcher::{expand_eval, has_eval};
use crate::cel::{Bindings, Engine, FunctionMap, MatcherOutcome, RelationMap};
use crate::config::EnforcerConfig;
use crate::effect::{DefaultEffector, Effect, EffectKind, Effector};
use crate::error::{AuthzError, Result};
use crate::model::{Model, PolicyOp};
use crate::roles::{MatchingFn, RoleLinkTable, RoleManager, SharedRoleManager};
use crate::types::Value;
use crate::watcher::{PolicyChange, Watcher};

/// Everything `enforce` reads, swapped as a unit by writers
struct EnforcerState {
    model: Model,
    role_links: RoleLinkTable,
    relations: RelationMap,
    effect_kind: EffectKind,
    functions: FunctionMap,
    filtered: bool,
}

impl EnforcerState {
    fn install_role_links(&mut self, role_links: RoleLinkTable) {
        self.relations = role_links.relations();
        self.role_links = role_links;
    }
}

/// Cached entries held by an [`Enforcer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcerCacheStats {
    /// Compiled matcher programs, including per-row `eval()` expansions
    pub programs: usize,
    /// Regular expressions compiled by the built-in matcher functions
    pub patterns: usize,
}

/// PERM-model policy enforcer
///
/// # Example
///
/// ```rust,no_run
/// use perm_authz::Enforcer;
///
/// # async fn example() -> perm_authz::Result<()> {
/// let enforcer = Enforcer::from_files("model.conf", "policy.csv").await?;
///
/// if enforcer.enforce(["alice", "data1", "read"])? {
///     println!("Access granted!");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Enforcer {
    state: RwLock<EnforcerState>,
    adapter: tokio::sync::Mutex<Box<dyn Adapter>>,
    watcher: RwLock<Option<Box<dyn Watcher>>>,
    effector: Box<dyn Effector>,
    engine: Engine,
    config: EnforcerConfig,
}

impl Enforcer {
    /// Create an enforcer with the default configuration and load its policy
    pub async fn new(model: Model, adapter: impl Adapter + 'static) -> Result<Self> {
        Self::with_config(model, adapter, EnforcerConfig::default()).await
    }

    /// Create an enforcer and load its policy
    ///
    /// # Errors
    ///
    /// Returns an error if the model is incomplete, names an unknown effect,
    /// has a matcher that does not compile, or the adapter fails to load.
    pub async fn with_config(
        model: Model,
        adapter: impl Adapter + 'static,
        config: EnforcerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let engine = Engine::with_cache(config.cache_matchers);
        let effect_kind = check_model(&model, &engine)?;

        let role_links = RoleLinkTable::new(config.max_hierarchy_level);
        let enforcer = Self {
            state: RwLock::new(EnforcerState {
                relations: role_links.relations(),
                role_links,
                model,
                effect_kind,
                functions: FunctionMap::with_builtins(),
                filtered: false,
            }),
            adapter: tokio::sync::Mutex::new(Box::new(adapter)),
            watcher: RwLock::new(None),
            effector: Box::new(DefaultEffector::new()),
            engine,
            config,
        };

        enforcer.load_policy().await?;
        info!(effect = %effect_kind, "Enforcer initialized");
        Ok(enforcer)
    }

    /// Model file plus CSV policy file
    pub async fn from_files(model_path: impl AsRef<Path>, policy_path: impl AsRef<Path>) -> Result<Self> {
        let model = Model::from_file(model_path)?;
        Self::new(model, FileAdapter::new(policy_path.as_ref())).await
    }

    /// Model text with an empty in-memory policy
    pub async fn from_model_text(text: &str) -> Result<Self> {
        Self::new(Model::from_text(text)?, MemoryAdapter::new()).await
    }

    // ========================================================================
    // Enforcement
    // ========================================================================

    /// Decide whether `request` is allowed
    ///
    /// # Errors
    ///
    /// Fails when the enforcer is disabled, the request arity differs from
    /// the `r` definition, or a policy row has the wrong arity. Per-row
    /// evaluation errors are not errors: the row simply does not apply.
    pub fn enforce<I, V>(&self, request: I) -> Result<bool>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if !self.config.enabled {
            return Err(AuthzError::Disabled);
        }

        let request: Vec<Value> = request.into_iter().map(Into::into).collect();
        let result = {
            let state = self.state.read();
            self.evaluate(&state, &request)?
        };

        if self.config.log_decisions {
            log_decision(&request, result);
        }
        Ok(result)
    }

    fn evaluate(&self, state: &EnforcerState, request: &[Value]) -> Result<bool> {
        let model = &state.model;
        let r = model
            .assertion("r", "r")
            .ok_or_else(|| AuthzError::InvalidModel("missing request definition 'r'".to_string()))?;
        let p = model
            .assertion("p", "p")
            .ok_or_else(|| AuthzError::InvalidModel("missing policy definition 'p'".to_string()))?;
        let matcher = model.matcher()?;

        if r.tokens.len() != request.len() {
            return Err(AuthzError::RequestArity {
                expected: r.tokens.len(),
                actual: request.len(),
            });
        }

        let mut bindings = Bindings::for_request(&r.tokens, request);
        let mut context = self.engine.build_context(&state.functions, &state.relations);
        let uses_eval = has_eval(matcher);
        let program = if uses_eval {
            None
        } else {
            Some(self.engine.compile(matcher).map_err(|e| {
                AuthzError::Config(format!("matcher does not compile: {}", e))
            })?)
        };

        let mut effects: Vec<Effect> = Vec::with_capacity(p.policy.len().max(1));
        let mut matcher_results: Vec<f64> = Vec::new();

        if p.policy.is_empty() {
            let program = program.as_ref().ok_or_else(|| {
                AuthzError::Config("matcher uses eval() but the policy has no rows".to_string())
            })?;
            bindings.bind_empty_rule(&p.tokens);
            let effect = match self.engine.execute(program, &mut context, &bindings) {
                Ok(outcome) if outcome.is_match() => Effect::Allow,
                Ok(_) => Effect::Indeterminate,
                Err(e) => {
                    warn!(error = %e, "Matcher evaluation failed without policy rows");
                    Effect::Indeterminate
                }
            };
            effects.push(effect);
        }

        let eft_index = p.eft_index();
        for rule in &p.policy {
            if rule.len() != p.tokens.len() {
                return Err(AuthzError::PolicyShape {
                    key: p.key.clone(),
                    expected: p.tokens.len(),
                    actual: rule.len(),
                });
            }
            bindings.bind_rule(&p.tokens, rule);

            let outcome = match &program {
                Some(program) => self.engine.execute(program, &mut context, &bindings),
                None => expand_eval(matcher, &bindings)
                    .and_then(|expr| self.engine.compile(&expr))
                    .and_then(|program| self.engine.execute(&program, &mut context, &bindings)),
            };

            let effect = match outcome {
                Ok(outcome) if outcome.is_match() => {
                    if let MatcherOutcome::Number(n) = outcome {
                        matcher_results.push(n);
                    }
                    Effect::from_eft(eft_index.and_then(|i| rule.get(i)).map(String::as_str))
                }
                Ok(_) => Effect::Indeterminate,
                Err(e) => {
                    warn!(rule = %rule.join(", "), error = %e, "Policy row evaluation failed");
                    Effect::Indeterminate
                }
            };
            debug!(rule = %rule.join(", "), ?effect, "Policy row evaluated");

            effects.push(effect);
            if state.effect_kind.stops_after(effect) {
                break;
            }
        }

        Ok(self
            .effector
            .merge_effects(state.effect_kind, &effects, &matcher_results))
    }

    // ========================================================================
    // Policy lifecycle
    // ========================================================================

    /// Reload the whole policy from the adapter and rebuild role links
    pub async fn load_policy(&self) -> Result<()> {
        let (mut model, mut role_links) = self.detached_copy(true);
        {
            let mut adapter = self.adapter.lock().await;
            adapter.load_policy(&mut model).await?;
        }
        self.install_loaded(&mut model, &mut role_links)?;
        self.swap_in(model, role_links, false);
        info!("Policy loaded");
        Ok(())
    }

    /// Replace the policy with the rows accepted by `filter`
    ///
    /// # Errors
    ///
    /// Fails with `UnsupportedOperation`, before anything is loaded, when the
    /// adapter cannot filter.
    pub async fn load_filtered_policy(&self, filter: &Filter) -> Result<()> {
        self.load_filtered(filter, true).await
    }

    /// Add the rows accepted by `filter` to the current policy
    pub async fn load_increment_filtered_policy(&self, filter: &Filter) -> Result<()> {
        self.load_filtered(filter, false).await
    }

    async fn load_filtered(&self, filter: &Filter, clear: bool) -> Result<()> {
        let (mut model, mut role_links) = self.detached_copy(clear);
        {
            let mut adapter = self.adapter.lock().await;
            if !adapter.supports_filtering() {
                return Err(AuthzError::UnsupportedOperation(
                    "adapter does not support filtered policy loading".to_string(),
                ));
            }
            adapter.load_filtered_policy(&mut model, filter).await?;
        }
        self.install_loaded(&mut model, &mut role_links)?;
        self.swap_in(model, role_links, true);
        info!(?filter, incremental = !clear, "Filtered policy loaded");
        Ok(())
    }

    /// Model copy (optionally without rows) and an empty role-link table
    fn detached_copy(&self, clear: bool) -> (Model, RoleLinkTable) {
        let state = self.state.read();
        let mut model = state.model.clone();
        if clear {
            model.clear_policy();
        }
        (model, state.role_links.fresh())
    }

    fn install_loaded(&self, model: &mut Model, role_links: &mut RoleLinkTable) -> Result<()> {
        model.sort_policies_by_priority()?;
        if self.config.auto_build_role_links {
            model.build_role_links(role_links)?;
        }
        model.log_model();
        Ok(())
    }

    fn swap_in(&self, model: Model, role_links: RoleLinkTable, filtered: bool) {
        let mut state = self.state.write();
        state.model = model;
        state.install_role_links(role_links);
        state.filtered = filtered;
        self.reset_caches(&state);
    }

    /// Drop compiled matcher programs and regular expressions
    ///
    /// Per-row `eval()` expansions and row patterns are cached as they are
    /// first seen; they go stale once the rows they came from are gone.
    fn reset_caches(&self, state: &EnforcerState) {
        self.engine.clear_cache();
        state.functions.patterns().clear();
    }

    /// Sizes of the evaluation caches
    pub fn cache_stats(&self) -> EnforcerCacheStats {
        let state = self.state.read();
        EnforcerCacheStats {
            programs: self.engine.cache_stats().size,
            patterns: state.functions.patterns().len(),
        }
    }

    /// Write the whole policy through the adapter and notify the watcher
    ///
    /// # Errors
    ///
    /// Fails with `FilteredPolicy` when only part of the policy is loaded.
    pub async fn save_policy(&self) -> Result<()> {
        let model = {
            let state = self.state.read();
            if state.filtered {
                return Err(AuthzError::FilteredPolicy);
            }
            state.model.clone()
        };

        self.adapter.lock().await.save_policy(&model).await?;
        self.notify(&PolicyChange::SavePolicy);
        info!("Policy saved");
        Ok(())
    }

    /// Drop every policy and role row in memory (the adapter is not touched)
    pub fn clear_policy(&self) {
        let mut state = self.state.write();
        state.model.clear_policy();
        state.role_links.clear();
    }

    /// Rebuild every role graph from the current `g*` rows
    pub fn build_role_links(&self) -> Result<()> {
        let mut state = self.state.write();
        let mut role_links = state.role_links.fresh();
        state.model.build_role_links(&mut role_links)?;
        state.install_role_links(role_links);
        Ok(())
    }

    /// Whether the current policy came from a filtered load
    pub fn is_filtered(&self) -> bool {
        self.state.read().filtered
    }

    // ========================================================================
    // Model, functions and collaborators
    // ========================================================================

    /// Copy of the current model
    pub fn get_model(&self) -> Model {
        self.state.read().model.clone()
    }

    /// Replace the model (rows included) and rebuild its role links
    pub fn set_model(&self, mut model: Model) -> Result<()> {
        let effect_kind = check_model(&model, &self.engine)?;
        model.sort_policies_by_priority()?;

        let mut state = self.state.write();
        let mut role_links = state.role_links.fresh();
        if self.config.auto_build_role_links {
            model.build_role_links(&mut role_links)?;
        }
        state.model = model;
        state.effect_kind = effect_kind;
        state.install_role_links(role_links);
        self.reset_caches(&state);
        Ok(())
    }

    /// Replace the adapter; the current policy stays loaded
    pub async fn set_adapter(&self, adapter: impl Adapter + 'static) {
        *self.adapter.lock().await = Box::new(adapter);
    }

    pub fn set_watcher(&self, watcher: impl Watcher + 'static) {
        *self.watcher.write() = Some(Box::new(watcher));
    }

    /// Register a custom two-argument matcher function
    pub fn add_function<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&str, &str) -> crate::cel::Result<bool> + Send + Sync + 'static,
    {
        self.state.write().functions.add(name, function);
    }

    /// Replace the role manager of relation `ptype` and fill it from the
    /// relation's current rows
    pub fn set_role_manager(&self, ptype: &str, manager: Box<dyn RoleManager>) -> Result<()> {
        let mut state = self.state.write();
        let EnforcerState { model, role_links, .. } = &mut *state;

        role_links.insert(ptype, manager);
        let rules = model.get_policy("g", ptype);
        model.build_incremental_role_links(role_links, PolicyOp::Add, ptype, &rules)?;

        let relations = role_links.relations();
        state.relations = relations;
        Ok(())
    }

    /// Install a node-matching function on relation `ptype`
    ///
    /// The function survives policy reloads.
    pub fn add_matching_fn(&self, ptype: &str, matching_fn: MatchingFn) {
        let mut state = self.state.write();
        let manager = state.role_links.manager_or_default(ptype);
        manager.write().set_matching_fn(Some(matching_fn));
        let relations = state.role_links.relations();
        state.relations = relations;
    }

    /// Shared handle to the role manager of relation `ptype`
    pub fn get_role_manager(&self, ptype: &str) -> Option<SharedRoleManager> {
        self.state.read().role_links.get(ptype)
    }

    // ========================================================================
    // Toggles
    // ========================================================================

    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    pub fn enable_enforce(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn enable_auto_save(&mut self, auto_save: bool) {
        self.config.auto_save = auto_save;
    }

    pub fn enable_auto_build_role_links(&mut self, auto_build_role_links: bool) {
        self.config.auto_build_role_links = auto_build_role_links;
    }

    pub fn enable_auto_notify_watcher(&mut self, auto_notify_watcher: bool) {
        self.config.auto_notify_watcher = auto_notify_watcher;
    }

    pub fn enable_log(&mut self, log_decisions: bool) {
        self.config.log_decisions = log_decisions;
    }

    fn notify(&self, change: &PolicyChange) {
        if let Some(watcher) = self.watcher.read().as_ref() {
            if let Err(e) = watcher.update(change) {
                warn!(error = %e, "Watcher update failed");
            }
        }
    }
}

/// Validate sections, effect and (eval-free) matcher of a model
fn check_model(model: &Model, engine: &Engine) -> Result<EffectKind> {
    model.validate()?;
    let matcher = model.matcher()?;
    if !has_eval(matcher) {
        engine
            .compile(matcher)
            .map_err(|e| AuthzError::Config(format!("matcher does not compile: {}", e)))?;
    }
    model.effect_kind()
}

fn log_decision(request: &[Value], result: bool) {
    let request = request
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if result {
        info!("Request: {} ---> {}", request, result);
    } else {
        warn!("Request: {} ---> {}", request, result);
    }
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Enforcer")
            .field("effect_kind", &state.effect_kind)
            .field("role_links", &state.role_links)
            .field("filtered", &state.filtered)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;

    async fn basic() -> Enforcer {
        let adapter = MemoryAdapter::with_rules(vec![("p", vec!["admin", "data1", "read"])]);
        Enforcer::new(Model::from_text(BASIC).unwrap(), adapter).await.unwrap()
    }

    #[tokio::test]
    async fn test_basic_decisions() {
        let e = basic().await;
        assert!(e.enforce(["admin", "data1", "read"]).unwrap());
        assert!(!e.enforce(["admin", "data1", "write"]).unwrap());
        assert!(!e.enforce(["admin2", "data1", "read"]).unwrap());
    }

    #[test]
    fn test_enforce_outside_runtime() {
        let e = tokio_test::block_on(basic());
        assert!(e.enforce(["admin", "data1", "read"]).unwrap());
    }

    #[tokio::test]
    async fn test_request_arity() {
        let e = basic().await;
        let result = e.enforce(["admin", "data1"]);
        assert!(matches!(result, Err(AuthzError::RequestArity { expected: 3, actual: 2 })));
    }

    #[tokio::test]
    async fn test_disabled() {
        let mut e = basic().await;
        e.enable_enforce(false);
        assert!(matches!(e.enforce(["admin", "data1", "read"]), Err(AuthzError::Disabled)));
        e.enable_enforce(true);
        assert!(e.enforce(["admin", "data1", "read"]).unwrap());
    }

    #[tokio::test]
    async fn test_matcher_compile_error_is_fatal() {
        let text = BASIC.replace("m = r.sub == p.sub && r.obj == p.obj && r.act == p.act", "m = r.sub == (");
        let result = Enforcer::from_model_text(&text).await;
        assert!(matches!(result, Err(AuthzError::Config(_))));
    }

    #[tokio::test]
    async fn test_clear_policy() {
        let e = basic().await;
        e.clear_policy();
        assert!(!e.enforce(["admin", "data1", "read"]).unwrap());
        assert!(e.get_model().get_policy("p", "p").is_empty());
    }
}
