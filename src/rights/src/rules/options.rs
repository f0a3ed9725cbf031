//! Rule modes and definition options

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a rule is declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Relation over the principal only (static)
    System,
    /// Relation over principal and resource (dynamic)
    Resource,
    /// Relation usable with or without a resource (static and dynamic)
    Pretest,
    /// Right; classification is inferred from its condition
    Right,
}

impl Mode {
    pub fn is_relation(self) -> bool {
        !matches!(self, Mode::Right)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::System => "system",
            Mode::Resource => "resource",
            Mode::Pretest => "pretest",
            Mode::Right => "right",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigurationError;

    /// Accepts `system`, `:system`, `System`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        match name.trim_start_matches(':').to_ascii_lowercase().as_str() {
            "system" => Ok(Mode::System),
            "resource" => Ok(Mode::Resource),
            "pretest" => Ok(Mode::Pretest),
            "right" => Ok(Mode::Right),
            _ => Err(ConfigurationError::InvalidMode(name.to_string())),
        }
    }
}

/// Evaluation point a rule is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalMode {
    /// Without a resource, before the action runs
    Static,
    /// Against a concrete resource
    Dynamic,
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalMode::Static => f.write_str("static"),
            EvalMode::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// Options accepted by `define`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOptions {
    /// Evaluate against the principal's role objects of this name
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub as_role: Option<String>,

    /// Capability the raw principal must hold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is: Option<String>,

    /// Whether a principal must be present (rules default to `true`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_principal: Option<bool>,
}

impl RuleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `as` role
    pub fn as_role(mut self, role: impl Into<String>) -> Self {
        self.as_role = Some(role.into());
        self
    }

    /// Set the `is` capability guard
    pub fn is(mut self, capability: impl Into<String>) -> Self {
        self.is = Some(capability.into());
        self
    }

    pub fn require_principal(mut self, required: bool) -> Self {
        self.require_principal = Some(required);
        self
    }

    /// Parse a compact option list such as `"as: student, require_principal: false"`.
    ///
    /// Symbol-style values (`as: :student`) are accepted.
    pub fn parse(rule: &str, source: &str) -> Result<Self, ConfigurationError> {
        let invalid = |message: String| ConfigurationError::InvalidOption {
            rule: rule.to_string(),
            message,
        };

        let mut options = Self::default();
        for entry in source.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once(':')
                .ok_or_else(|| invalid(format!("expected `key: value`, found `{entry}`")))?;
            let key = key.trim();
            let value = value.trim().trim_start_matches(':').trim();
            if value.is_empty() {
                return Err(invalid(format!("option `{key}` has no value")));
            }

            match key {
                "as" => options.as_role = Some(value.to_string()),
                "is" => options.is = Some(value.to_string()),
                "require_principal" => {
                    let required = value
                        .parse()
                        .map_err(|_| invalid(format!("`require_principal` expects true or false, found `{value}`")))?;
                    options.require_principal = Some(required);
                }
                other => return Err(invalid(format!("unknown option `{other}`"))),
            }
        }

        Ok(options)
    }
}
