//! Request-scoped security context

pub mod binding;
pub mod cache;
pub mod security_context;

pub use binding::{ActionBinding, BindingSource};
pub use cache::{ContextStats, ObjectKey, ValidatedSet};
pub use security_context::SecurityContext;
