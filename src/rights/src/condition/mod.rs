//! Condition expression compiler
//!
//! Compiles conditions such as `"if owner or administrator"` or
//! `"if corrector: assignment.course"` into an [`Expr`] tree that the policy
//! interpreter evaluates. Compilation is syntactic only; referenced names are
//! resolved against a rule set during classification.

pub mod ast;
pub mod parser;

pub use ast::{Argument, Expr, Literal, RemoteRight, CURRENT_PRINCIPAL};

use crate::error::ConfigurationError;
use std::fmt;

const NAME_PREFIXES: &[&str] = &["may_", "is_", "can_", "has_"];
const NAME_SUFFIXES: &[&str] = &["_for", "_in", "_of", "_to"];

/// Strip readability decorations from a rule reference.
///
/// `is_owner_of?` resolves to `owner`, `may_edit` to `edit`. One prefix and
/// one suffix are removed at most; a name that would become empty is kept.
pub fn normalize_name(token: &str) -> &str {
    let mut name = token.strip_suffix('?').unwrap_or(token);

    if let Some(rest) = NAME_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
    {
        name = rest;
    }

    if let Some(rest) = NAME_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .filter(|rest| !rest.is_empty())
    {
        name = rest;
    }

    name
}

/// Compiled condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    source: String,
    expr: Expr,
    references: Vec<String>,
    needs_resource: bool,
}

impl Condition {
    /// Compile a condition string
    pub fn compile(source: &str) -> Result<Self, ConfigurationError> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.trim().to_string(),
            references: expr.references(),
            needs_resource: expr.needs_resource(),
            expr,
        })
    }

    /// Source text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Local rule names referenced by the condition, as written
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Whether the condition uses `self`, a field path or a remote right
    pub fn needs_resource(&self) -> bool {
        self.needs_resource
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
