//! Evaluator bound to one resource at a time

use super::class::PolicyClass;
use super::interpreter::{call, Scope};
use super::static_policy::StaticPolicy;
use crate::error::{AccessDenied, AuthzError, Result};
use crate::registry::PolicyTable;
use crate::rules::{EvalMode, RuleSet};
use crate::types::{Principal, ResourceRef};
use std::sync::Arc;
use tracing::debug;

/// Dynamic evaluator of one resource type for one principal.
///
/// Holds the resource under evaluation, so one instance checks resources
/// sequentially. Use one instance per concurrent check.
#[derive(Debug, Clone)]
pub struct Policy {
    table: Arc<PolicyTable>,
    class: Arc<PolicyClass>,
    principal: Option<Principal>,
    resource: Option<ResourceRef>,
}

impl Policy {
    pub(crate) fn new(table: Arc<PolicyTable>, class: Arc<PolicyClass>, principal: Option<Principal>) -> Self {
        Self {
            table,
            class,
            principal,
            resource: None,
        }
    }

    pub fn resource_type(&self) -> &str {
        self.class.resource_type()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Resource currently bound
    pub fn resource(&self) -> Option<&ResourceRef> {
        self.resource.as_ref()
    }

    pub fn rule_set(&self) -> &Arc<RuleSet> {
        self.class.rule_set()
    }

    /// Static counterpart sharing this policy's rule set
    pub fn static_policy(&self) -> StaticPolicy {
        StaticPolicy::new(Arc::clone(&self.table), Arc::clone(&self.class), self.principal.clone())
    }

    /// Bind the resource subsequent checks run against
    pub fn bind(&mut self, resource: ResourceRef) {
        self.resource = Some(resource);
    }

    pub fn unbind(&mut self) -> Option<ResourceRef> {
        self.resource.take()
    }

    /// Bind `resource` and evaluate `rule` against it
    pub fn allowed(&mut self, rule: &str, resource: &ResourceRef) -> Result<bool> {
        self.bind(Arc::clone(resource));
        self.check(rule)
    }

    /// Evaluate `rule` against the bound resource
    pub fn check(&self, rule: &str) -> Result<bool> {
        let predicate = self.class.predicate(rule, EvalMode::Dynamic)?;
        let scope = Scope {
            table: &self.table,
            class: &self.class,
            principal: self.principal.as_ref(),
            resource: self.resource.as_ref(),
            args: &[],
            depth: 0,
        };
        call(&predicate, EvalMode::Dynamic, &scope)
    }

    /// Evaluate rules in order against the bound resource, skipping those
    /// that are not dynamic.
    ///
    /// Fails with [`AccessDenied`] on the first rule that evaluates false.
    pub fn evaluate_dynamically(&self, rules: &[&str]) -> Result<()> {
        for &rule in rules {
            if !self.rule_set().classification_of(rule)?.is_dynamic {
                debug!(resource_type = %self.resource_type(), rule, "Skipping non-dynamic rule");
                continue;
            }
            if !self.check(rule)? {
                return Err(AuthzError::AccessDenied(AccessDenied {
                    principal: self.principal.as_ref().map(|p| p.id.clone()),
                    rule: rule.to_string(),
                    resource_type: self.resource_type().to_string(),
                    resource: self.resource.as_ref().map(|r| r.resource_id()),
                }));
            }
        }
        Ok(())
    }
}
