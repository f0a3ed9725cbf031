//! Request-scoped evaluation orchestrator

use super::binding::{ActionBinding, BindingSource};
use super::cache::{ContextStats, ObjectKey, ValidatedSet};
use crate::error::{AccessDenied, AuthzError, Result};
use crate::policy::Policy;
use crate::registry::PolicyTable;
use crate::types::{Principal, ResourceRef, ResourceResolver, ResourceType};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Rule evaluation state of one request.
///
/// Owns the write-once principal, the bindings of the current action and the
/// decisions taken so far. Not shared between requests; create one per
/// request and derive sub-units with [`copy`](Self::copy).
pub struct SecurityContext {
    id: Uuid,
    table: Arc<PolicyTable>,
    resolver: Arc<dyn ResourceResolver>,
    principal: Option<Principal>,
    bindings: Vec<ActionBinding>,
    validated: ValidatedSet,
    policies: HashMap<ResourceType, Policy>,
    stats: ContextStats,
}

impl SecurityContext {
    /// Context without a principal
    pub fn new(table: Arc<PolicyTable>, resolver: Arc<dyn ResourceResolver>) -> Self {
        let id = Uuid::new_v4();
        debug!(context = %id, generation = table.generation(), "Created security context");
        Self {
            id,
            table,
            resolver,
            principal: None,
            bindings: Vec::new(),
            validated: ValidatedSet::new(),
            policies: HashMap::new(),
            stats: ContextStats::default(),
        }
    }

    /// Context for an authenticated principal
    pub fn with_principal(table: Arc<PolicyTable>, resolver: Arc<dyn ResourceResolver>, principal: Principal) -> Self {
        let mut context = Self::new(table, resolver);
        context.principal = Some(principal);
        context
    }

    /// Request id recorded in log fields
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn table(&self) -> &Arc<PolicyTable> {
        &self.table
    }

    /// Set the principal. Fails if one is already set.
    pub fn set_principal(&mut self, principal: Principal) -> Result<()> {
        if self.principal.is_some() {
            return Err(AuthzError::PrincipalAlreadySet);
        }
        debug!(context = %self.id, principal = %principal.id, "Principal set");
        self.principal = Some(principal);
        // decisions taken without a principal no longer apply
        self.policies.clear();
        self.validated.clear();
        Ok(())
    }

    pub fn stats(&self) -> ContextStats {
        self.stats
    }

    /// Principal-only snapshot sharing the policy table and resolver
    pub fn copy(&self) -> SecurityContext {
        let mut copy = Self::new(Arc::clone(&self.table), Arc::clone(&self.resolver));
        copy.principal = self.principal.clone();
        copy
    }

    fn policy_mut(&mut self, resource_type: &str) -> Result<&mut Policy> {
        match self.policies.entry(resource_type.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let policy = self.table.policy(resource_type, self.principal.clone())?;
                Ok(entry.insert(policy))
            }
        }
    }

    /// Cache category of `right` on `resource_type`
    fn category(&self, right: &str, resource_type: &str) -> Result<String> {
        let class = self.table.class(resource_type)?;
        let name = class
            .rule_set()
            .canonical_name(right)
            .ok_or_else(|| AuthzError::RuleNotFound {
                resource_type: resource_type.to_string(),
                name: right.to_string(),
            })?;
        Ok(format!("{resource_type}.{name}"))
    }

    /// Whether the principal has `right` on `resource_type`, or on `resource`
    /// when given.
    ///
    /// Decisions are cached for the lifetime of the context. A rule that
    /// needs a principal evaluates false while none is set. `resource` must
    /// be of `resource_type`.
    pub fn allowed(&mut self, right: &str, resource_type: &str, resource: Option<&ResourceRef>) -> Result<bool> {
        if let Some(resource) = resource.filter(|resource| resource.resource_type() != resource_type) {
            return Err(AuthzError::ResourceTypeMismatch {
                expected: resource_type.to_string(),
                actual: resource.resource_type().to_string(),
                id: resource.resource_id(),
            });
        }
        let category = self.category(right, resource_type)?;
        let key = resource.map(|resource| ObjectKey::of(&**resource));

        if let Some(allowed) = self.validated.get(&category, &key) {
            self.stats.cache_hits += 1;
            debug!(context = %self.id, category = %category, allowed, "Decision cache hit");
            return Ok(allowed);
        }

        let is_static = self
            .table
            .class(resource_type)?
            .rule_set()
            .classification_of(right)?
            .is_static;

        self.stats.evaluations += 1;
        let policy = self.policy_mut(resource_type)?;
        let result = match resource {
            Some(resource) => policy.allowed(right, resource),
            None if is_static => policy.static_policy().allowed(right),
            None => {
                policy.unbind();
                policy.check(right)
            }
        };

        let allowed = match result {
            Ok(allowed) => allowed,
            Err(AuthzError::PrincipalRequired { rule }) => {
                debug!(context = %self.id, rule = %rule, "No principal, rule evaluates false");
                false
            }
            Err(err) => return Err(err),
        };

        if !allowed {
            self.stats.denials += 1;
        }
        self.validated.record(&category, key, allowed);
        Ok(allowed)
    }

    /// Like [`allowed`](Self::allowed) but fails with [`AccessDenied`] when
    /// the check evaluates false.
    pub fn apply(&mut self, right: &str, resource_type: &str, resource: Option<&ResourceRef>) -> Result<bool> {
        if self.allowed(right, resource_type, resource)? {
            return Ok(true);
        }

        let denied = AccessDenied {
            principal: self.principal.as_ref().map(|p| p.id.clone()),
            rule: right.to_string(),
            resource_type: resource_type.to_string(),
            resource: resource.map(|r| r.resource_id()),
        };
        if self.table.config().log_denials {
            warn!(
                context = %self.id,
                principal = denied.principal.as_deref().unwrap_or("anonymous"),
                rule = %denied.rule,
                resource_type = %denied.resource_type,
                resource = denied.resource.as_deref().unwrap_or(""),
                "Access denied"
            );
        }
        Err(denied.into())
    }

    /// Keep the resources the principal has `right` on.
    ///
    /// A denial of one item never aborts the others.
    pub fn filter_allowed(
        &mut self,
        right: &str,
        resource_type: &str,
        resources: &[ResourceRef],
    ) -> Result<Vec<ResourceRef>> {
        let mut kept = Vec::with_capacity(resources.len());
        for resource in resources {
            if self.allowed(right, resource_type, Some(resource))? {
                kept.push(Arc::clone(resource));
            }
        }
        Ok(kept)
    }

    /// Whether `right` was already granted for `resource` in this request
    pub fn is_validated(&self, right: &str, resource_type: &str, resource: Option<&ResourceRef>) -> bool {
        let Ok(category) = self.category(right, resource_type) else {
            return false;
        };
        let key = resource.map(|resource| ObjectKey::of(&**resource));
        self.validated.is_validated(&category, &key)
    }

    /// Install the bindings of the current action
    pub fn bind_action(&mut self, bindings: Vec<ActionBinding>) {
        debug!(context = %self.id, bindings = bindings.len(), "Bound action");
        self.bindings = bindings;
    }

    pub fn bindings(&self) -> &[ActionBinding] {
        &self.bindings
    }

    fn supports(&self, binding: &ActionBinding, dynamic: bool) -> Result<bool> {
        let classification = self
            .table
            .class(&binding.resource_type)?
            .rule_set()
            .classification_of(&binding.action)?;
        Ok(if dynamic {
            classification.is_dynamic
        } else {
            classification.is_static
        })
    }

    /// Apply every static binding before the action runs
    pub fn check_static(&mut self) -> Result<()> {
        for binding in self.bindings.clone() {
            if !self.supports(&binding, false)? {
                debug!(context = %self.id, rule = %binding.action, "Skipping non-static binding");
                continue;
            }
            self.apply(&binding.action, &binding.resource_type, None)?;
        }
        Ok(())
    }

    /// Apply parameter bindings to the objects their ids resolve to.
    ///
    /// Missing parameters and unknown ids are skipped.
    pub fn check_bound(&mut self, params: &HashMap<String, String>) -> Result<()> {
        for binding in self.bindings.clone() {
            let BindingSource::Param(key) = &binding.source else {
                continue;
            };
            let Some(id) = params.get(key) else {
                continue;
            };
            if !self.supports(&binding, true)? {
                continue;
            }

            let resolved = self
                .resolver
                .resolve(&binding.resource_type, id)
                .map_err(|err| AuthzError::Resolver {
                    resource_type: binding.resource_type.clone(),
                    id: id.clone(),
                    message: format!("{err:#}"),
                })?;
            if let Some(resource) = resolved {
                self.apply(&binding.action, &binding.resource_type, Some(&resource))?;
            }
        }
        Ok(())
    }

    /// Apply variable bindings to the objects assigned to each variable
    pub fn check_variables(&mut self, variables: &HashMap<String, Vec<ResourceRef>>) -> Result<()> {
        for binding in self.bindings.clone() {
            let BindingSource::Variable(name) = &binding.source else {
                continue;
            };
            let Some(objects) = variables.get(name) else {
                continue;
            };
            if !self.supports(&binding, true)? {
                continue;
            }
            for object in objects {
                self.apply(&binding.action, &binding.resource_type, Some(object))?;
            }
        }
        Ok(())
    }

    /// Re-validate the bindings that apply to an object met mid-request
    pub fn observe(&mut self, resource: &ResourceRef) -> Result<()> {
        let resource_type = resource.resource_type().to_string();
        for binding in self.bindings.clone() {
            if binding.resource_type != resource_type || !self.supports(&binding, true)? {
                continue;
            }
            self.apply(&binding.action, &binding.resource_type, Some(resource))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("id", &self.id)
            .field("principal", &self.principal.as_ref().map(|p| p.id.as_str()))
            .field("bindings", &self.bindings)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
