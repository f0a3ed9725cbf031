//! Policy evaluators
//!
//! Every resource type has one [`PolicyClass`] (rule set plus predicate
//! table). [`StaticPolicy`] evaluates its rules without a resource before an
//! action runs; [`Policy`] evaluates them against one bound resource.

pub mod class;
pub mod dynamic;
pub(crate) mod interpreter;
pub mod static_policy;

pub use class::PolicyClass;
pub use dynamic::Policy;
pub use static_policy::StaticPolicy;
