//! Per-resource-type predicate table

use crate::error::{AuthzError, Result};
use crate::rules::rule::CompiledBody;
use crate::rules::{EvalMode, Rule, RuleSet};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Rule set of one resource type plus its materialized predicates.
///
/// Shared by every [`Policy`](super::Policy) and
/// [`StaticPolicy`](super::StaticPolicy) of the type.
#[derive(Debug)]
pub struct PolicyClass {
    rules: Arc<RuleSet>,
    predicates: DashMap<(String, EvalMode), Arc<Rule>>,
}

impl PolicyClass {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self {
            rules,
            predicates: DashMap::new(),
        }
    }

    pub fn resource_type(&self) -> &str {
        self.rules.resource_type()
    }

    pub fn rule_set(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    /// Predicate for `name` in `mode`, materialized on first use.
    ///
    /// Predicates are keyed by the rule name a token resolves to, so `show`,
    /// `show?` and `may_show?` share one entry. A dynamic predicate
    /// delegating to a static rule also registers that static partner.
    pub fn predicate(&self, token: &str, mode: EvalMode) -> Result<Arc<Rule>> {
        let name = self
            .rules
            .canonical_name(token)
            .ok_or_else(|| AuthzError::RuleNotFound {
                resource_type: self.resource_type().to_string(),
                name: token.to_string(),
            })?;
        let key = (name.clone(), mode);
        if let Some(rule) = self.predicates.get(&key).map(|entry| Arc::clone(entry.value())) {
            return Ok(rule);
        }

        let resolved = self.rules.get_rule(&name, mode)?;
        let rule = Arc::clone(self.predicates.entry(key).or_insert(resolved).value());
        debug!(
            resource_type = %self.resource_type(),
            rule = %name,
            mode = %mode,
            "Materialized predicate"
        );

        if let CompiledBody::Delegate(partner) = &rule.body {
            self.predicates
                .entry((name, EvalMode::Static))
                .or_insert_with(|| Arc::clone(partner));
        }

        Ok(rule)
    }

    /// Number of materialized predicates
    pub fn materialized(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_materialized(&self, token: &str, mode: EvalMode) -> bool {
        self.rules
            .canonical_name(token)
            .is_some_and(|name| self.predicates.contains_key(&(name, mode)))
    }
}
