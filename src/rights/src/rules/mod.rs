//! Relations, rights and per-resource-type rule sets

pub mod body;
pub mod graph;
pub mod options;
pub mod rule;
pub mod rule_set;

pub use body::{NativePredicate, RuleBody, RuleContext};
pub use graph::{GraphError, RuleGraph};
pub use options::{EvalMode, Mode, RuleOptions};
pub use rule::{Classification, Rule};
pub use rule_set::{RuleSet, RESERVED_NAMES};
