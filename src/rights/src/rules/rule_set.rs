//! Per-resource-type rule collection
//!
//! Rules live in three buckets: `static_rules` and `dynamic_rules` hold rules
//! by the evaluation mode they support, `ambiguous` holds rights whose
//! classification has not been computed yet. A classified right moves into
//! one or both mode buckets. A bucket missing a name is filled with a copy
//! of the universal rule of that mode on first use, so a local dynamic
//! relation leaves the universal static relation of the same name visible.

use super::body::RuleBody;
use super::graph::RuleGraph;
use super::options::{EvalMode, Mode, RuleOptions};
use super::rule::{Classification, Rule};
use crate::condition::{normalize_name, CURRENT_PRINCIPAL};
use crate::error::{AuthzError, BucketKind, ConfigurationError, Result};
use crate::types::ResourceType;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Names that collide with policy operations
pub const RESERVED_NAMES: &[&str] = &[
    "allowed",
    "apply",
    "bind",
    "evaluate_statically",
    "evaluate_dynamically",
    "principal",
    "resource",
    "rule_set",
    CURRENT_PRINCIPAL,
];

fn lookup(bucket: &DashMap<String, Arc<Rule>>, name: &str) -> Option<Arc<Rule>> {
    bucket.get(name).map(|entry| Arc::clone(entry.value()))
}

/// Names a reference may resolve to: as written, then normalized
pub fn candidates(token: &str) -> Vec<String> {
    let mut names = vec![token.to_string()];
    let normalized = normalize_name(token);
    if normalized != token {
        names.push(normalized.to_string());
    }
    names
}

/// Rules of one resource type
#[derive(Debug)]
pub struct RuleSet {
    resource_type: ResourceType,
    parent: Option<Arc<RuleSet>>,
    static_rules: DashMap<String, Arc<Rule>>,
    dynamic_rules: DashMap<String, Arc<Rule>>,
    ambiguous: DashMap<String, Arc<Rule>>,
    /// Locally defined names in declaration order; also serializes bucket changes
    declared: Mutex<Vec<String>>,
}

impl RuleSet {
    /// Create an empty rule set, optionally inheriting from `parent`
    pub fn new(resource_type: impl Into<ResourceType>, parent: Option<Arc<RuleSet>>) -> Self {
        Self {
            resource_type: resource_type.into(),
            parent,
            static_rules: DashMap::new(),
            dynamic_rules: DashMap::new(),
            ambiguous: DashMap::new(),
            declared: Mutex::new(Vec::new()),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn parent(&self) -> Option<&Arc<RuleSet>> {
        self.parent.as_ref()
    }

    /// Locally defined rule names in declaration order
    pub fn rule_names(&self) -> Vec<String> {
        self.declared.lock().clone()
    }

    /// Whether `name` is present in any local bucket
    pub fn contains(&self, name: &str) -> bool {
        self.static_rules.contains_key(name)
            || self.dynamic_rules.contains_key(name)
            || self.ambiguous.contains_key(name)
    }

    /// Construct and add a rule
    pub fn define(
        &self,
        name: &str,
        mode: Mode,
        options: RuleOptions,
        body: impl Into<RuleBody>,
    ) -> std::result::Result<Arc<Rule>, ConfigurationError> {
        let rule = Rule::new(self.resource_type.clone(), name, mode, options, body.into())?;
        self.add(rule)
    }

    /// Add a rule; rules of another type are copied onto this one
    pub fn add(&self, rule: Rule) -> std::result::Result<Arc<Rule>, ConfigurationError> {
        let rule = if rule.resource_type() == self.resource_type {
            rule
        } else {
            rule.rebind(self.resource_type.clone())
        };
        let name = rule.name().to_string();
        let kind = match rule.mode() {
            Mode::Right => BucketKind::Right,
            Mode::System | Mode::Pretest => BucketKind::StaticRelation,
            Mode::Resource => BucketKind::DynamicRelation,
        };

        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(ConfigurationError::ReservedName {
                kind,
                resource_type: self.resource_type.clone(),
                name,
            });
        }

        let mut declared = self.declared.lock();
        if let Some(kind) = self.conflict(&rule) {
            return Err(ConfigurationError::DuplicateRule {
                kind,
                resource_type: self.resource_type.clone(),
                name,
            });
        }

        let rule = Arc::new(rule);
        self.insert(&name, &rule);
        if !declared.contains(&name) {
            declared.push(name);
        }
        Ok(rule)
    }

    /// Install a rule bypassing the reserved-name check
    pub(crate) fn add_builtin(&self, rule: Rule) {
        let _guard = self.declared.lock();
        let name = rule.name().to_string();
        self.insert(&name, &Arc::new(rule));
    }

    /// Local right named `name`, classified or not
    fn right_named(&self, name: &str) -> Option<Arc<Rule>> {
        lookup(&self.ambiguous, name)
            .or_else(|| lookup(&self.static_rules, name).filter(|rule| rule.is_right()))
            .or_else(|| lookup(&self.dynamic_rules, name).filter(|rule| rule.is_right()))
    }

    fn conflict(&self, rule: &Rule) -> Option<BucketKind> {
        let name = rule.name();
        let has_right = self.right_named(name).is_some();

        match rule.mode() {
            Mode::Right => self.contains(name).then_some(BucketKind::Right),
            _ if has_right => Some(BucketKind::Right),
            Mode::System => self.static_rules.contains_key(name).then_some(BucketKind::StaticRelation),
            Mode::Resource => self.dynamic_rules.contains_key(name).then_some(BucketKind::DynamicRelation),
            Mode::Pretest => {
                if self.static_rules.contains_key(name) {
                    Some(BucketKind::StaticRelation)
                } else if self.dynamic_rules.contains_key(name) {
                    Some(BucketKind::DynamicRelation)
                } else {
                    None
                }
            }
        }
    }

    fn insert(&self, name: &str, rule: &Arc<Rule>) {
        match rule.mode() {
            Mode::Right => {
                self.ambiguous.insert(name.to_string(), Arc::clone(rule));
            }
            Mode::System => {
                self.static_rules.insert(name.to_string(), Arc::clone(rule));
            }
            Mode::Resource => {
                self.dynamic_rules.insert(name.to_string(), Arc::clone(rule));
            }
            Mode::Pretest => {
                self.static_rules.insert(name.to_string(), Arc::clone(rule));
                self.dynamic_rules.insert(name.to_string(), Arc::clone(rule));
            }
        }
    }

    fn bucket(&self, mode: EvalMode) -> &DashMap<String, Arc<Rule>> {
        match mode {
            EvalMode::Static => &self.static_rules,
            EvalMode::Dynamic => &self.dynamic_rules,
        }
    }

    /// Distinct local rules named `name`
    fn variants(&self, name: &str) -> Vec<Arc<Rule>> {
        let mut rules: Vec<Arc<Rule>> = Vec::new();
        let found = [
            lookup(&self.ambiguous, name),
            lookup(&self.static_rules, name),
            lookup(&self.dynamic_rules, name),
        ];
        for rule in found.into_iter().flatten() {
            if !rules.iter().any(|known| Arc::ptr_eq(known, &rule)) {
                rules.push(rule);
            }
        }
        rules
    }

    /// Name a reference resolves to here or in the parent chain
    pub fn canonical_name(&self, token: &str) -> Option<String> {
        let names = candidates(token);
        if let Some(local) = names.iter().find(|name| self.contains(name)) {
            return Some(local.clone());
        }
        self.parent.as_ref()?.canonical_name(token)
    }

    fn not_found(&self, token: &str) -> AuthzError {
        AuthzError::RuleNotFound {
            resource_type: self.resource_type.clone(),
            name: token.to_string(),
        }
    }

    /// Rule for `token` in the requested evaluation mode.
    ///
    /// Classifies pending rights and copies inherited rules on first use. A
    /// dynamic request for a static-only rule yields a delegate that evaluates
    /// the static rule without the resource.
    pub fn get_rule(&self, token: &str, mode: EvalMode) -> Result<Arc<Rule>> {
        let name = self.canonical_name(token).ok_or_else(|| self.not_found(token))?;
        if let Some(rule) = lookup(self.bucket(mode), &name) {
            return Ok(rule);
        }

        self.prepare(&name, &[mode])?;
        if let Some(rule) = lookup(self.bucket(mode), &name) {
            return Ok(rule);
        }

        if mode == EvalMode::Dynamic {
            self.prepare(&name, &[EvalMode::Static])?;
            if let Some(partner) = lookup(&self.static_rules, &name) {
                debug!(
                    resource_type = %self.resource_type,
                    rule = %name,
                    "Delegating dynamic request to static rule"
                );
                return Ok(Arc::new(Rule::delegate(partner)));
            }
        }

        Err(self.not_found(token))
    }

    /// Delegate to the static rule `token` even when a dynamic rule of that name exists
    pub fn static_delegate(&self, token: &str) -> Result<Arc<Rule>> {
        let partner = self.get_rule(token, EvalMode::Static)?;
        Ok(Arc::new(Rule::delegate(partner)))
    }

    /// Combined classification of every rule named `token`
    pub fn classification_of(&self, token: &str) -> Result<Classification> {
        let name = self.canonical_name(token).ok_or_else(|| self.not_found(token))?;
        self.prepare(&name, &[EvalMode::Static, EvalMode::Dynamic])?;
        self.aggregate(&name).ok_or_else(|| self.not_found(token))
    }

    /// Classify every pending right
    pub fn classify_all(&self) -> Result<()> {
        let pending: Vec<String> = self.ambiguous.iter().map(|entry| entry.key().clone()).collect();
        for name in pending {
            self.prepare(&name, &[])?;
        }
        Ok(())
    }

    /// Fill the `modes` buckets from the parent and classify a pending right `name`
    fn prepare(&self, name: &str, modes: &[EvalMode]) -> Result<()> {
        let _guard = self.declared.lock();
        for &mode in modes {
            self.inherit_locked(name, mode);
        }
        if self.ambiguous.contains_key(name) {
            self.classify_locked(name)?;
        }
        Ok(())
    }

    /// Splice an independent copy of the parent's rule `name` for `mode`
    /// when the local bucket lacks it. Local rights shadow every inherited
    /// rule of their name. Caller holds `declared`.
    fn inherit_locked(&self, name: &str, mode: EvalMode) -> bool {
        if self.bucket(mode).contains_key(name) || self.right_named(name).is_some() {
            return false;
        }
        let Some(parent) = &self.parent else {
            return false;
        };
        let Some(inherited) = parent.inherited_rule(name, mode) else {
            return false;
        };

        let copy = Arc::new(inherited.rebind(self.resource_type.clone()));
        match copy.mode() {
            Mode::Right if self.contains(name) => return false,
            Mode::Right => {
                self.ambiguous.insert(name.to_string(), Arc::clone(&copy));
            }
            Mode::Pretest => {
                for bucket in [&self.static_rules, &self.dynamic_rules] {
                    bucket.entry(name.to_string()).or_insert_with(|| Arc::clone(&copy));
                }
            }
            Mode::System | Mode::Resource => {
                self.bucket(mode).insert(name.to_string(), Arc::clone(&copy));
            }
        }

        debug!(
            resource_type = %self.resource_type,
            rule = %name,
            mode = %mode,
            from = %parent.resource_type,
            "Inherited rule"
        );
        true
    }

    /// Rule a child inherits for `name` in `mode`: a right of that name, else
    /// the relation in the `mode` bucket, searched up the parent chain
    fn inherited_rule(&self, name: &str, mode: EvalMode) -> Option<Arc<Rule>> {
        self.right_named(name)
            .or_else(|| lookup(self.bucket(mode), name))
            .or_else(|| self.parent.as_ref()?.inherited_rule(name, mode))
    }

    /// Canonical local name for a reference, filling both buckets from the
    /// parent. Caller holds `declared`.
    fn resolve_locked(&self, token: &str) -> Option<String> {
        let name = self.canonical_name(token)?;
        for mode in [EvalMode::Static, EvalMode::Dynamic] {
            self.inherit_locked(&name, mode);
        }
        self.contains(&name).then_some(name)
    }

    fn aggregate(&self, name: &str) -> Option<Classification> {
        self.variants(name)
            .iter()
            .map(|rule| rule.classification())
            .try_fold(None::<Classification>, |acc, next| {
                let next = next?;
                Some(Some(match acc {
                    None => next,
                    Some(acc) => Classification {
                        is_static: acc.is_static || next.is_static,
                        is_dynamic: acc.is_dynamic || next.is_dynamic,
                        requires_principal: acc.requires_principal || next.requires_principal,
                    },
                }))
            })
            .flatten()
    }

    /// Classify `root` and every pending right it depends on.
    /// Caller holds `declared`.
    fn classify_locked(&self, root: &str) -> Result<()> {
        let mut graph = RuleGraph::new();
        let mut pending: HashMap<String, (Arc<Rule>, Vec<String>)> = HashMap::new();
        let mut stack = vec![root.to_string()];

        while let Some(name) = stack.pop() {
            if graph.contains(&name) {
                continue;
            }
            let Some(rule) = lookup(&self.ambiguous, &name) else {
                continue;
            };

            let mut dependencies = Vec::with_capacity(rule.references().len());
            for token in rule.references() {
                let dependency = self.resolve_locked(token).ok_or_else(|| self.not_found(token))?;
                if self.ambiguous.contains_key(&dependency) && !graph.contains(&dependency) {
                    stack.push(dependency.clone());
                }
                dependencies.push(dependency);
            }

            graph.add_node(name.clone(), dependencies.clone());
            pending.insert(name, (rule, dependencies));
        }

        for name in graph.topological_order().map_err(ConfigurationError::from)? {
            let Some((rule, dependencies)) = pending.remove(&name) else {
                continue;
            };
            let classification = self.classify_right(&rule, &dependencies)?;
            let classification = rule.set_classification(classification);

            self.ambiguous.remove(&name);
            if classification.is_static {
                self.static_rules.insert(name.clone(), Arc::clone(&rule));
            }
            if classification.is_dynamic {
                self.dynamic_rules.insert(name.clone(), Arc::clone(&rule));
            }

            debug!(
                resource_type = %self.resource_type,
                rule = %name,
                is_static = classification.is_static,
                is_dynamic = classification.is_dynamic,
                requires_principal = classification.requires_principal,
                "Classified right"
            );
        }

        Ok(())
    }

    fn classify_right(&self, rule: &Rule, dependencies: &[String]) -> std::result::Result<Classification, ConfigurationError> {
        let needs_resource = rule.needs_resource();
        let mut is_static = !needs_resource;
        let mut is_dynamic = needs_resource;
        let mut requires_principal = false;

        for dependency in dependencies {
            let referenced = self.aggregate(dependency).ok_or_else(|| ConfigurationError::Unclassifiable {
                rule: format!("{}.{}", self.resource_type, dependency),
            })?;
            is_static &= referenced.is_static;
            is_dynamic |= referenced.is_dynamic;
            requires_principal |= referenced.requires_principal;
        }

        if !is_static && !is_dynamic {
            return Err(ConfigurationError::Unclassifiable {
                rule: rule.qualified_name(),
            });
        }

        Ok(Classification {
            is_static,
            is_dynamic,
            requires_principal: rule.options().require_principal.unwrap_or(requires_principal),
        })
    }
}
