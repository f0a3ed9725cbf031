//! Error types for the rights engine

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use thiserror::Error;

/// Result type for rule evaluation and registry operations
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Bucket a rule name occupies inside a rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKind {
    /// Right (condition over other rules)
    Right,
    /// Relation evaluated without a resource
    StaticRelation,
    /// Relation evaluated against a resource
    DynamicRelation,
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKind::Right => write!(f, "right"),
            BucketKind::StaticRelation => write!(f, "static relation"),
            BucketKind::DynamicRelation => write!(f, "dynamic relation"),
        }
    }
}

/// Errors raised while loading rule definitions. Fatal at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Rule name already present in the target bucket
    #[error("{kind} `{name}` is already defined for resource type `{resource_type}`")]
    DuplicateRule {
        kind: BucketKind,
        resource_type: String,
        name: String,
    },

    /// Rule name collides with a policy method
    #[error("`{name}` is reserved and cannot be defined as a {kind} on `{resource_type}`")]
    ReservedName {
        kind: BucketKind,
        resource_type: String,
        name: String,
    },

    /// Right that is neither statically nor dynamically evaluable
    #[error("rule `{rule}` is neither static nor dynamic")]
    Unclassifiable { rule: String },

    /// Rights referencing each other in a loop
    #[error("circular rule reference: {path}")]
    CircularReference { path: String },

    /// Condition string is not syntactically valid
    #[error("invalid condition `{condition}`: {message}")]
    InvalidCondition { condition: String, message: String },

    /// Unknown rule mode
    #[error("unknown rule mode `{0}` (expected system, resource, pretest or right)")]
    InvalidMode(String),

    /// Option or body not usable with the rule's mode
    #[error("invalid definition of `{rule}`: {message}")]
    InvalidOption { rule: String, message: String },
}

/// How a failing rule body was expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Native predicate closure
    Native,
    /// Compiled condition string
    Condition,
}

impl fmt::Display for BodyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyKind::Native => write!(f, "native predicate"),
            BodyKind::Condition => write!(f, "condition"),
        }
    }
}

/// Failure raised inside a rule body, wrapped with the rule it came from
#[derive(Debug, Clone, Error)]
#[error("rule `{rule}` ({kind}) failed: {message}")]
pub struct RuleExecutionError {
    /// Qualified rule name (`resource_type.rule`)
    pub rule: String,

    /// Whether the body was a closure or a condition string
    pub kind: BodyKind,

    /// Message of the original error or panic
    pub message: String,

    /// Backtrace frames outside the engine, innermost first
    pub backtrace: Vec<String>,
}

impl RuleExecutionError {
    pub(crate) fn new(
        rule: impl Into<String>,
        kind: BodyKind,
        message: impl Into<String>,
        capture_backtrace: bool,
    ) -> Self {
        Self {
            rule: rule.into(),
            kind,
            message: message.into(),
            backtrace: if capture_backtrace {
                trimmed_backtrace()
            } else {
                Vec::new()
            },
        }
    }
}

/// Denial of a rule for a principal. The only expected error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "access denied: {} may not `{rule}` on {resource_type}{}",
    .principal.as_deref().unwrap_or("anonymous principal"),
    .resource.as_ref().map(|id| format!(" `{id}`")).unwrap_or_default()
)]
pub struct AccessDenied {
    /// Principal id, if any
    pub principal: Option<String>,

    /// Rule (action) that evaluated false
    pub rule: String,

    /// Resource type the rule belongs to
    pub resource_type: String,

    /// Resource id, if the check was dynamic
    pub resource: Option<String>,
}

/// Rights engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Invalid rule definitions
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Rule name unknown for the resource type
    #[error("rule `{name}` not found for resource type `{resource_type}`")]
    RuleNotFound { resource_type: String, name: String },

    /// Rule body failed
    #[error(transparent)]
    RuleExecution(#[from] RuleExecutionError),

    /// Rule evaluated false
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    /// Rule needs a principal but none is set
    #[error("rule `{rule}` requires a principal")]
    PrincipalRequired { rule: String },

    /// No policy registered for the resource type
    #[error("resource type `{0}` has no policy")]
    UnknownResourceType(String),

    /// Resource passed for a check does not belong to the checked type
    #[error("{actual} `{id}` cannot be checked as {expected}")]
    ResourceTypeMismatch {
        expected: String,
        actual: String,
        id: String,
    },

    /// Security context principal is write-once
    #[error("security context principal is already set")]
    PrincipalAlreadySet,

    /// Resource resolver failure
    #[error("failed to resolve {resource_type} `{id}`: {message}")]
    Resolver {
        resource_type: String,
        id: String,
        message: String,
    },
}

impl AuthzError {
    /// Whether this error is an access denial
    pub fn is_access_denied(&self) -> bool {
        matches!(self, AuthzError::AccessDenied(_))
    }

    /// Whether this error stems from invalid rule definitions
    pub fn is_configuration(&self) -> bool {
        matches!(self, AuthzError::Configuration(_))
    }
}

/// Symbol prefixes of frames that belong to the engine or the runtime.
const INTERNAL_FRAME_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "<std::",
    "<core::",
    "<alloc::",
    "__rust",
    "rust_begin_unwind",
    "_start",
    "__libc",
];

fn is_internal_frame(symbol: &str) -> bool {
    symbol.contains("cretoai_rights::")
        || INTERNAL_FRAME_PREFIXES
            .iter()
            .any(|prefix| symbol.starts_with(prefix))
}

/// Capture the current backtrace, keeping only application frames.
pub(crate) fn trimmed_backtrace() -> Vec<String> {
    let rendered = Backtrace::force_capture().to_string();
    rendered
        .lines()
        .filter_map(|line| {
            let (index, symbol) = line.trim().split_once(": ")?;
            if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Some(symbol.trim().to_string())
        })
        .filter(|symbol| !is_internal_frame(symbol))
        .collect()
}

/// Message carried by a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "rule body panicked".to_string()
    }
}
