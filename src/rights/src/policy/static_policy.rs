//! Evaluator for rules that need no resource

use super::class::PolicyClass;
use super::interpreter::{call, Scope};
use crate::error::{AccessDenied, AuthzError, Result};
use crate::registry::PolicyTable;
use crate::rules::{EvalMode, RuleSet};
use crate::types::Principal;
use std::sync::Arc;
use tracing::debug;

/// Static evaluator of one resource type for one principal
#[derive(Debug, Clone)]
pub struct StaticPolicy {
    table: Arc<PolicyTable>,
    class: Arc<PolicyClass>,
    principal: Option<Principal>,
}

impl StaticPolicy {
    pub(crate) fn new(table: Arc<PolicyTable>, class: Arc<PolicyClass>, principal: Option<Principal>) -> Self {
        Self {
            table,
            class,
            principal,
        }
    }

    pub fn resource_type(&self) -> &str {
        self.class.resource_type()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Rule set shared with the dynamic [`Policy`](super::Policy) of the type
    pub fn rule_set(&self) -> &Arc<RuleSet> {
        self.class.rule_set()
    }

    /// Evaluate a static rule
    pub fn allowed(&self, rule: &str) -> Result<bool> {
        let predicate = self.class.predicate(rule, EvalMode::Static)?;
        let scope = Scope {
            table: &self.table,
            class: &self.class,
            principal: self.principal.as_ref(),
            resource: None,
            args: &[],
            depth: 0,
        };
        call(&predicate, EvalMode::Static, &scope)
    }

    /// Evaluate rules in order, skipping those that are not static.
    ///
    /// Fails with [`AccessDenied`] on the first rule that evaluates false.
    pub fn evaluate_statically(&self, rules: &[&str]) -> Result<()> {
        for &rule in rules {
            if !self.rule_set().classification_of(rule)?.is_static {
                debug!(resource_type = %self.resource_type(), rule, "Skipping non-static rule");
                continue;
            }
            if !self.allowed(rule)? {
                return Err(AuthzError::AccessDenied(AccessDenied {
                    principal: self.principal.as_ref().map(|p| p.id.clone()),
                    rule: rule.to_string(),
                    resource_type: self.resource_type().to_string(),
                    resource: None,
                }));
            }
        }
        Ok(())
    }
}
