//! Rule: one named relation or right bound to a resource type

use super::body::{NativePredicate, RuleBody};
use super::options::{Mode, RuleOptions};
use crate::condition::Condition;
use crate::error::{BodyKind, ConfigurationError};
use crate::types::ResourceType;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Evaluation modes a rule supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Evaluable without a resource
    pub is_static: bool,

    /// Evaluable against a resource
    pub is_dynamic: bool,

    /// Needs a principal to be evaluated
    pub requires_principal: bool,
}

impl Classification {
    fn for_relation(mode: Mode, requires_principal: bool) -> Self {
        Self {
            is_static: matches!(mode, Mode::System | Mode::Pretest),
            is_dynamic: matches!(mode, Mode::Resource | Mode::Pretest),
            requires_principal,
        }
    }
}

#[derive(Clone)]
pub(crate) enum CompiledBody {
    Native(NativePredicate),
    Condition(Arc<Condition>),
    Constant(bool),
    /// Dynamic stand-in evaluating a static partner without the resource
    Delegate(Arc<Rule>),
}

impl fmt::Debug for CompiledBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledBody::Native(_) => f.write_str("Native(..)"),
            CompiledBody::Condition(condition) => write!(f, "Condition({:?})", condition.source()),
            CompiledBody::Constant(value) => write!(f, "Constant({value})"),
            CompiledBody::Delegate(partner) => write!(f, "Delegate({})", partner.node_key()),
        }
    }
}

/// Relation or right
///
/// Relations are classified by their mode when created. A right's
/// classification is inferred from the rules its condition references and
/// is computed once by its rule set.
#[derive(Debug)]
pub struct Rule {
    name: String,
    resource_type: ResourceType,
    mode: Mode,
    options: RuleOptions,
    pub(crate) body: CompiledBody,
    classification: OnceLock<Classification>,
}

impl Rule {
    /// Build a rule, compiling condition bodies
    pub fn new(
        resource_type: impl Into<ResourceType>,
        name: impl Into<String>,
        mode: Mode,
        options: RuleOptions,
        body: RuleBody,
    ) -> Result<Self, ConfigurationError> {
        let resource_type = resource_type.into();
        let name = name.into();
        let invalid = |message: &str| ConfigurationError::InvalidOption {
            rule: format!("{resource_type}.{name}"),
            message: message.to_string(),
        };

        let body = match (mode, body) {
            (Mode::Right, RuleBody::Native(_)) => {
                return Err(invalid("rights are defined by a condition, not a native predicate"))
            }
            (Mode::Right, _) if options.as_role.is_some() => {
                return Err(invalid("`as` applies to relations only"))
            }
            (Mode::Right, RuleBody::Condition(source)) => {
                CompiledBody::Condition(Arc::new(Condition::compile(&source)?))
            }
            (_, RuleBody::Condition(_)) => {
                return Err(invalid("relations take a native predicate or a constant"))
            }
            (_, RuleBody::Native(predicate)) => CompiledBody::Native(predicate),
            (_, RuleBody::Constant(value)) => CompiledBody::Constant(value),
        };

        let classification = OnceLock::new();
        if mode.is_relation() {
            let requires_principal = options.require_principal.unwrap_or(true);
            let _ = classification.set(Classification::for_relation(mode, requires_principal));
        }

        Ok(Self {
            name,
            resource_type,
            mode,
            options,
            body,
            classification,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn options(&self) -> &RuleOptions {
        &self.options
    }

    pub fn is_right(&self) -> bool {
        self.mode == Mode::Right
    }

    /// `resource_type.name`, used in error messages and logs
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    /// Key of the rule in a dependency graph
    pub fn node_key(&self) -> String {
        format!("{}.{}:{}", self.resource_type, self.name, self.mode)
    }

    /// Number of evaluation inputs: the principal, plus the resource unless `system`
    pub fn arity(&self) -> usize {
        match self.mode {
            Mode::System => 1,
            _ => 2,
        }
    }

    /// Compiled condition of a right
    pub fn condition(&self) -> Option<&Condition> {
        match &self.body {
            CompiledBody::Condition(condition) => Some(condition),
            _ => None,
        }
    }

    /// Rule names the condition references, as written
    pub fn references(&self) -> &[String] {
        self.condition().map(Condition::references).unwrap_or(&[])
    }

    pub fn needs_resource(&self) -> bool {
        self.condition().is_some_and(Condition::needs_resource)
    }

    /// Classification, once known
    pub fn classification(&self) -> Option<Classification> {
        self.classification.get().copied()
    }

    pub(crate) fn set_classification(&self, classification: Classification) -> Classification {
        *self.classification.get_or_init(|| classification)
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self.body, CompiledBody::Delegate(_))
    }

    pub(crate) fn body_kind(&self) -> BodyKind {
        match &self.body {
            CompiledBody::Native(_) => BodyKind::Native,
            CompiledBody::Delegate(partner) => partner.body_kind(),
            CompiledBody::Condition(_) | CompiledBody::Constant(_) => BodyKind::Condition,
        }
    }

    /// Independent copy bound to another resource type.
    ///
    /// Rights are reclassified against their new rule set.
    pub fn rebind(&self, resource_type: impl Into<ResourceType>) -> Rule {
        let classification = OnceLock::new();
        if self.mode.is_relation() {
            if let Some(known) = self.classification() {
                let _ = classification.set(known);
            }
        }

        Rule {
            name: self.name.clone(),
            resource_type: resource_type.into(),
            mode: self.mode,
            options: self.options.clone(),
            body: self.body.clone(),
            classification,
        }
    }

    /// Dynamic rule answering with a classified static partner, ignoring the resource
    pub fn delegate(partner: Arc<Rule>) -> Rule {
        let requires_principal = partner
            .classification()
            .map_or(true, |c| c.requires_principal);
        let classification = OnceLock::new();
        let _ = classification.set(Classification {
            is_static: false,
            is_dynamic: true,
            requires_principal,
        });

        Rule {
            name: partner.name.clone(),
            resource_type: partner.resource_type.clone(),
            mode: partner.mode,
            options: RuleOptions::default(),
            body: CompiledBody::Delegate(partner),
            classification,
        }
    }
}
