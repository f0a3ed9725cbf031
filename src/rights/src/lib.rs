//! # CretoAI Rights Engine
//!
//! Declarative relation/right rules per resource type, evaluated against a
//! principal and, for dynamic rules, a concrete resource.
//!
//! ## Concepts
//!
//! - **Relations** are predicates over the principal (`system`), the principal
//!   and a resource (`resource`), or either (`pretest`).
//! - **Rights** are conditions over relations and other rights, such as
//!   `"if enrolled or responsible"`. Whether a right is static, dynamic or both
//!   is inferred from what it references.
//! - A [`PolicyRegistry`] compiles the definitions into one [`PolicyClass`] per
//!   resource type. [`SecurityContext`] drives evaluation for one request and
//!   caches its decisions.
//!
//! ## Example
//!
//! ```rust
//! use cretoai_rights::{
//!     Definitions, EngineConfig, InMemoryResolver, Mode, PolicyRegistry, Principal,
//!     RuleOptions, SecurityContext,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> cretoai_rights::Result<()> {
//!     let registry = PolicyRegistry::build(
//!         |definitions: &mut Definitions| -> cretoai_rights::Result<()> {
//!             definitions
//!                 .resource("course")
//!                 .relation("staff", Mode::System, RuleOptions::new().is("staff"), |_| Ok(true))?
//!                 .right("index", "if staff")?;
//!             Ok(())
//!         },
//!         EngineConfig::default(),
//!     )?;
//!
//!     let principal = Principal::new("user:alice").with_capability("staff");
//!     let mut context = SecurityContext::with_principal(
//!         registry.snapshot(),
//!         Arc::new(InMemoryResolver::new()),
//!         principal,
//!     );
//!
//!     assert!(context.allowed("index", "course", None)?);
//!     Ok(())
//! }
//! ```

pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod policy;
pub mod registry;
pub mod rules;
pub mod types;

// Re-export commonly used types
pub use condition::{normalize_name, Condition, Expr};
pub use config::EngineConfig;
pub use context::{ActionBinding, BindingSource, ContextStats, SecurityContext};
pub use error::{
    AccessDenied, AuthzError, BodyKind, BucketKind, ConfigurationError, Result, RuleExecutionError,
};
pub use policy::{Policy, PolicyClass, StaticPolicy};
pub use registry::{
    DefinitionLoader, Definitions, PolicyRegistry, PolicyTable, ResourceDefinitions, ALL_RESOURCES,
};
pub use rules::{
    Classification, EvalMode, Mode, Rule, RuleBody, RuleContext, RuleOptions, RuleSet,
};
pub use types::{
    ArgValue, InMemoryResolver, Principal, Resource, ResourceRef, ResourceResolver, ResourceType,
};
