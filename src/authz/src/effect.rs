//! Policy effects and effect combination
//!
//! Every evaluated policy row contributes one [`Effect`]. The effector folds
//! that ordered sequence into the final decision according to the
//! [`EffectKind`] selected by the model's `e` section.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthzError;

/// Effect contributed by a single policy row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Row matched and allows the request
    Allow,
    /// Row matched and denies the request
    Deny,
    /// Row did not match (or carried an unknown `eft`)
    Indeterminate,
}

impl Effect {
    /// Effect of a matched row given its `eft` column, if the model has one
    pub fn from_eft(eft: Option<&str>) -> Self {
        match eft {
            None | Some("allow") => Effect::Allow,
            Some("deny") => Effect::Deny,
            Some(_) => Effect::Indeterminate,
        }
    }
}

/// Effect-combination strategy named by the `e` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectKind {
    /// `some(where (p.eft == allow))`
    AllowOverride,
    /// `!some(where (p.eft == deny))`
    DenyOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    AllowAndDenyOverride,
    /// `priority(p.eft) || deny`
    Priority,
}

impl EffectKind {
    pub const ALLOW_OVERRIDE: &'static str = "some(where (p_eft == allow))";
    pub const DENY_OVERRIDE: &'static str = "!some(where (p_eft == deny))";
    pub const ALLOW_AND_DENY_OVERRIDE: &'static str =
        "some(where (p_eft == allow)) && !some(where (p_eft == deny))";
    pub const PRIORITY: &'static str = "priority(p_eft) || deny";

    /// Canonical (escaped) expression text for this kind
    pub fn expression(&self) -> &'static str {
        match self {
            EffectKind::AllowOverride => Self::ALLOW_OVERRIDE,
            EffectKind::DenyOverride => Self::DENY_OVERRIDE,
            EffectKind::AllowAndDenyOverride => Self::ALLOW_AND_DENY_OVERRIDE,
            EffectKind::Priority => Self::PRIORITY,
        }
    }

    /// Whether row iteration stops once a row records `effect`
    ///
    /// Only the priority strategy short-circuits: the first decisive row wins
    /// and later rows are never evaluated.
    pub fn stops_after(&self, effect: Effect) -> bool {
        matches!(self, EffectKind::Priority) && effect != Effect::Indeterminate
    }
}

impl FromStr for EffectKind {
    type Err = AuthzError;

    /// Select the strategy from the literal `e` expression (either `p.eft` or
    /// `p_eft` spelling, surrounding whitespace ignored)
    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let normalized = expr.trim().replace("p.eft", "p_eft");

        [
            EffectKind::AllowOverride,
            EffectKind::DenyOverride,
            EffectKind::AllowAndDenyOverride,
            EffectKind::Priority,
        ]
        .into_iter()
        .find(|kind| kind.expression() == normalized)
        .ok_or_else(|| AuthzError::UnknownEffect(expr.to_string()))
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.expression())
    }
}

/// Folds per-row effects into a final decision
pub trait Effector: Send + Sync {
    /// Merge `effects` (row order) and the numeric matcher results into a decision
    fn merge_effects(&self, kind: EffectKind, effects: &[Effect], matcher_results: &[f64]) -> bool;
}

/// Standard effector implementing the four built-in strategies
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEffector;

impl DefaultEffector {
    pub fn new() -> Self {
        Self
    }
}

impl Effector for DefaultEffector {
    fn merge_effects(&self, kind: EffectKind, effects: &[Effect], _matcher_results: &[f64]) -> bool {
        let has_allow = effects.contains(&Effect::Allow);
        let has_deny = effects.contains(&Effect::Deny);

        match kind {
            EffectKind::AllowOverride => has_allow,
            EffectKind::DenyOverride | EffectKind::AllowAndDenyOverride => has_allow && !has_deny,
            EffectKind::Priority => effects
                .iter()
                .find(|e| **e != Effect::Indeterminate)
                .map_or(false, |e| *e == Effect::Allow),
        }
    }
}
