//! Process-wide policy registry
//!
//! A [`DefinitionLoader`] declares rules per resource type into
//! [`Definitions`]. [`PolicyRegistry::build`] turns them into an immutable
//! [`PolicyTable`] (one [`PolicyClass`] per resource type) and
//! [`PolicyRegistry::reset`] rebuilds that table wholesale. Evaluations hold
//! an `Arc<PolicyTable>` snapshot, so a reset never changes rules under a
//! running check.

use crate::condition::CURRENT_PRINCIPAL;
use crate::config::EngineConfig;
use crate::error::{AuthzError, ConfigurationError, Result};
use crate::policy::{Policy, PolicyClass, StaticPolicy};
use crate::rules::{Mode, Rule, RuleBody, RuleContext, RuleOptions, RuleSet};
use crate::types::{Principal, ResourceType};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Resource type of the universal rule set every type inherits from
pub const ALL_RESOURCES: &str = "all_resources";

/// Supplies rule definitions when the registry is built or reset
pub trait DefinitionLoader: Send + Sync {
    fn load(&self, definitions: &mut Definitions) -> Result<()>;
}

impl<F> DefinitionLoader for F
where
    F: Fn(&mut Definitions) -> Result<()> + Send + Sync,
{
    fn load(&self, definitions: &mut Definitions) -> Result<()> {
        self(definitions)
    }
}

fn current_principal_rule() -> std::result::Result<Rule, ConfigurationError> {
    Rule::new(
        ALL_RESOURCES,
        CURRENT_PRINCIPAL,
        Mode::Resource,
        RuleOptions::default(),
        RuleBody::native(|ctx: &RuleContext<'_>| {
            Ok(match (ctx.resource(), ctx.principal()) {
                (Some(resource), Some(principal)) => resource.is_principal(principal),
                _ => false,
            })
        }),
    )
}

/// Rule sets under construction
#[derive(Debug)]
pub struct Definitions {
    universal: Arc<RuleSet>,
    rule_sets: IndexMap<ResourceType, Arc<RuleSet>>,
}

impl Definitions {
    fn new() -> std::result::Result<Self, ConfigurationError> {
        let universal = Arc::new(RuleSet::new(ALL_RESOURCES, None));
        universal.add_builtin(current_principal_rule()?);
        Ok(Self {
            universal,
            rule_sets: IndexMap::new(),
        })
    }

    /// Builder for the rules of `resource_type`; [`ALL_RESOURCES`] addresses
    /// the universal set
    pub fn resource(&mut self, resource_type: &str) -> ResourceDefinitions {
        if resource_type == ALL_RESOURCES {
            return ResourceDefinitions {
                rules: Arc::clone(&self.universal),
            };
        }

        let universal = &self.universal;
        let rules = self
            .rule_sets
            .entry(resource_type.to_string())
            .or_insert_with(|| Arc::new(RuleSet::new(resource_type, Some(Arc::clone(universal)))));
        ResourceDefinitions {
            rules: Arc::clone(rules),
        }
    }

    /// Resource types declared so far
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.rule_sets.keys().map(String::as_str)
    }
}

/// Rule declarations for one resource type
#[derive(Debug, Clone)]
pub struct ResourceDefinitions {
    rules: Arc<RuleSet>,
}

impl ResourceDefinitions {
    /// `define(name, mode, options, body)`
    pub fn define(
        &self,
        name: &str,
        mode: Mode,
        options: RuleOptions,
        body: impl Into<RuleBody>,
    ) -> std::result::Result<&Self, ConfigurationError> {
        self.rules.define(name, mode, options, body)?;
        Ok(self)
    }

    /// `define` with textual mode and options, e.g. `("resource", "as: student")`
    pub fn define_parsed(
        &self,
        name: &str,
        mode: &str,
        options: &str,
        body: impl Into<RuleBody>,
    ) -> std::result::Result<&Self, ConfigurationError> {
        let mode = mode.parse()?;
        let options = RuleOptions::parse(name, options)?;
        self.define(name, mode, options, body)
    }

    /// Relation with a native predicate
    pub fn relation<F>(
        &self,
        name: &str,
        mode: Mode,
        options: RuleOptions,
        predicate: F,
    ) -> std::result::Result<&Self, ConfigurationError>
    where
        F: Fn(&RuleContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.define(name, mode, options, RuleBody::native(predicate))
    }

    /// Right defined by a condition
    pub fn right(&self, name: &str, condition: &str) -> std::result::Result<&Self, ConfigurationError> {
        self.define(name, Mode::Right, RuleOptions::default(), condition)
    }

    /// Right with options (`is`, `require_principal`)
    pub fn right_with(
        &self,
        name: &str,
        options: RuleOptions,
        condition: &str,
    ) -> std::result::Result<&Self, ConfigurationError> {
        self.define(name, Mode::Right, options, condition)
    }

    pub fn rule_set(&self) -> &Arc<RuleSet> {
        &self.rules
    }
}

/// Immutable snapshot of every policy class
#[derive(Debug)]
pub struct PolicyTable {
    classes: IndexMap<ResourceType, Arc<PolicyClass>>,
    universal: Arc<RuleSet>,
    config: EngineConfig,
    generation: u64,
}

impl PolicyTable {
    fn build(loader: &dyn DefinitionLoader, config: EngineConfig, generation: u64) -> Result<Self> {
        let mut definitions = Definitions::new()?;
        loader.load(&mut definitions)?;

        let classes = definitions
            .rule_sets
            .into_iter()
            .map(|(resource_type, rules)| (resource_type, Arc::new(PolicyClass::new(rules))))
            .collect();
        let table = Self {
            classes,
            universal: definitions.universal,
            config,
            generation,
        };

        if table.config.classify_on_load {
            table.classify_all()?;
        }
        Ok(table)
    }

    /// Policy class of `resource_type`
    pub fn class(&self, resource_type: &str) -> Result<Arc<PolicyClass>> {
        self.classes
            .get(resource_type)
            .cloned()
            .ok_or_else(|| AuthzError::UnknownResourceType(resource_type.to_string()))
    }

    /// Resource types in declaration order
    pub fn resource_types(&self) -> Vec<&str> {
        self.classes.keys().map(String::as_str).collect()
    }

    pub fn universal(&self) -> &Arc<RuleSet> {
        &self.universal
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Incremented on every reset
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Static evaluator of `resource_type` for `principal`
    pub fn static_policy(self: &Arc<Self>, resource_type: &str, principal: Option<Principal>) -> Result<StaticPolicy> {
        let class = self.class(resource_type)?;
        Ok(StaticPolicy::new(Arc::clone(self), class, principal))
    }

    /// Dynamic evaluator of `resource_type` for `principal`
    pub fn policy(self: &Arc<Self>, resource_type: &str, principal: Option<Principal>) -> Result<Policy> {
        let class = self.class(resource_type)?;
        Ok(Policy::new(Arc::clone(self), class, principal))
    }

    /// Classify every right of every resource type
    pub fn classify_all(&self) -> Result<()> {
        for class in self.classes.values() {
            class.rule_set().classify_all()?;
        }
        Ok(())
    }
}

/// Owner of the current [`PolicyTable`]
pub struct PolicyRegistry {
    loader: Arc<dyn DefinitionLoader>,
    config: EngineConfig,
    table: RwLock<Arc<PolicyTable>>,
}

impl PolicyRegistry {
    /// Run the loader and build the first table
    pub fn build(loader: impl DefinitionLoader + 'static, config: EngineConfig) -> Result<Self> {
        let loader: Arc<dyn DefinitionLoader> = Arc::new(loader);
        let table = PolicyTable::build(loader.as_ref(), config.clone(), 0)?;
        info!(
            resource_types = table.classes.len(),
            classify_on_load = config.classify_on_load,
            "Built policy registry"
        );

        Ok(Self {
            loader,
            config,
            table: RwLock::new(Arc::new(table)),
        })
    }

    /// Current table
    pub fn snapshot(&self) -> Arc<PolicyTable> {
        Arc::clone(&self.table.read())
    }

    /// Rerun the loader and replace the table.
    ///
    /// On error the previous table stays in place.
    pub fn reset(&self) -> Result<()> {
        let mut table = self.table.write();
        let generation = table.generation + 1;
        let rebuilt = PolicyTable::build(self.loader.as_ref(), self.config.clone(), generation)?;
        info!(
            resource_types = rebuilt.classes.len(),
            generation,
            "Reset policy registry"
        );
        *table = Arc::new(rebuilt);
        Ok(())
    }

    /// Classify every right of the current table
    pub fn classify_all(&self) -> Result<()> {
        self.snapshot().classify_all()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("config", &self.config)
            .field("generation", &self.table.read().generation)
            .finish_non_exhaustive()
    }
}
