//! Rule bodies and the context native predicates receive

use crate::types::{ArgValue, Principal, Resource};
use std::fmt;
use std::sync::Arc;

/// Native relation predicate
pub type NativePredicate = Arc<dyn Fn(&RuleContext<'_>) -> anyhow::Result<bool> + Send + Sync>;

/// Body given to `define`
#[derive(Clone)]
pub enum RuleBody {
    /// Closure evaluated by the host application
    Native(NativePredicate),
    /// Condition over other rules, e.g. `"if owner or administrator"`
    Condition(String),
    /// Always true or always false
    Constant(bool),
}

impl RuleBody {
    /// Wrap a closure as a native body
    pub fn native<F>(predicate: F) -> Self
    where
        F: Fn(&RuleContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        RuleBody::Native(Arc::new(predicate))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RuleBody::Native(_) => "native",
            RuleBody::Condition(_) => "condition",
            RuleBody::Constant(_) => "constant",
        }
    }
}

impl fmt::Debug for RuleBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleBody::Native(_) => f.write_str("Native(..)"),
            RuleBody::Condition(source) => f.debug_tuple("Condition").field(source).finish(),
            RuleBody::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
        }
    }
}

impl From<&str> for RuleBody {
    fn from(source: &str) -> Self {
        RuleBody::Condition(source.to_string())
    }
}

impl From<String> for RuleBody {
    fn from(source: String) -> Self {
        RuleBody::Condition(source)
    }
}

impl From<bool> for RuleBody {
    fn from(value: bool) -> Self {
        RuleBody::Constant(value)
    }
}

/// What a native predicate sees during one evaluation
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub(crate) rule: &'a str,
    pub(crate) subject: Option<&'a Principal>,
    pub(crate) principal: Option<&'a Principal>,
    pub(crate) resource: Option<&'a dyn Resource>,
    pub(crate) args: &'a [ArgValue],
}

impl<'a> RuleContext<'a> {
    /// Qualified name of the rule being evaluated
    pub fn rule(&self) -> &'a str {
        self.rule
    }

    /// Role object selected by `as`, or the principal itself
    pub fn subject(&self) -> Option<&'a Principal> {
        self.subject
    }

    /// Raw principal of the evaluation
    pub fn principal(&self) -> Option<&'a Principal> {
        self.principal
    }

    /// Resource under evaluation; `None` in static evaluation
    pub fn resource(&self) -> Option<&'a dyn Resource> {
        self.resource
    }

    /// Resource downcast to its concrete type
    pub fn resource_as<T: Resource>(&self) -> Option<&'a T> {
        self.resource.and_then(|resource| resource.downcast_ref::<T>())
    }

    /// Extra arguments of a `type.right(path, args...)` call
    pub fn args(&self) -> &'a [ArgValue] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Option<&'a ArgValue> {
        self.args.get(index)
    }
}

impl fmt::Debug for RuleContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleContext")
            .field("rule", &self.rule)
            .field("subject", &self.subject.map(|s| s.id.as_str()))
            .field("principal", &self.principal.map(|p| p.id.as_str()))
            .field("resource", &self.resource)
            .field("args", &self.args)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Course;

    impl Resource for Course {
        fn resource_type(&self) -> &str {
            "course"
        }

        fn resource_id(&self) -> String {
            "1".to_string()
        }
    }

    #[test]
    fn test_body_conversions() {
        assert!(matches!(RuleBody::from("if owner"), RuleBody::Condition(ref s) if s == "if owner"));
        assert!(matches!(RuleBody::from(true), RuleBody::Constant(true)));
        assert_eq!(RuleBody::native(|_| Ok(true)).kind(), "native");
        assert_eq!(format!("{:?}", RuleBody::native(|_| Ok(false))), "Native(..)");
    }

    #[test]
    fn test_context_accessors() {
        let principal = Principal::new("user:alice");
        let course = Course;
        let args = [ArgValue::Int(1)];
        let ctx = RuleContext {
            rule: "course.show",
            subject: Some(&principal),
            principal: Some(&principal),
            resource: Some(&course),
            args: &args,
        };

        assert_eq!(ctx.rule(), "course.show");
        assert!(ctx.resource_as::<Course>().is_some());
        assert_eq!(ctx.arg(0).and_then(ArgValue::as_int), Some(1));
        assert!(ctx.arg(1).is_none());
        assert_eq!(ctx.subject().map(|s| s.id.as_str()), Some("user:alice"));
    }
}
