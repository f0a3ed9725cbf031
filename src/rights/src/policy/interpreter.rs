//! Evaluation of rules against a principal and an optional resource

use super::class::PolicyClass;
use crate::condition::{Argument, Expr, Literal, RemoteRight};
use crate::error::{panic_message, AuthzError, BodyKind, Result, RuleExecutionError};
use crate::registry::PolicyTable;
use crate::rules::rule::CompiledBody;
use crate::rules::{EvalMode, Mode, Rule, RuleContext};
use crate::types::{ArgValue, Principal, ResourceRef};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Inputs of one evaluation
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub table: &'a PolicyTable,
    pub class: &'a PolicyClass,
    pub principal: Option<&'a Principal>,
    pub resource: Option<&'a ResourceRef>,
    pub args: &'a [ArgValue],
    /// Nesting of remote right checks
    pub depth: usize,
}

impl Scope<'_> {
    fn capture_backtraces(&self) -> bool {
        self.table.config().capture_backtraces
    }
}

/// Evaluate `rule` in `mode`
pub(crate) fn call(rule: &Rule, mode: EvalMode, scope: &Scope<'_>) -> Result<bool> {
    if let CompiledBody::Delegate(partner) = &rule.body {
        let without_resource = Scope {
            resource: None,
            ..*scope
        };
        return call(partner, EvalMode::Static, &without_resource);
    }

    let requires_principal = rule
        .classification()
        .map_or(true, |classification| classification.requires_principal);
    let options = rule.options();

    if let Some(capability) = &options.is {
        if !scope.principal.is_some_and(|principal| principal.is(capability)) {
            return Ok(false);
        }
    }

    let Some(principal) = scope.principal else {
        if requires_principal {
            return Err(AuthzError::PrincipalRequired {
                rule: rule.qualified_name(),
            });
        }
        return evaluate_body(rule, mode, scope, None);
    };

    match &options.as_role {
        Some(role) => {
            for subject in principal.roles_as(role) {
                if evaluate_body(rule, mode, scope, Some(subject))? {
                    return Ok(true);
                }
            }
        }
        None => {
            if evaluate_body(rule, mode, scope, Some(principal))? {
                return Ok(true);
            }
        }
    }

    if !requires_principal {
        return evaluate_body(rule, mode, scope, None);
    }
    Ok(false)
}

fn evaluate_body(rule: &Rule, mode: EvalMode, scope: &Scope<'_>, subject: Option<&Principal>) -> Result<bool> {
    let resource = match mode {
        EvalMode::Static => None,
        EvalMode::Dynamic => scope.resource,
    };

    match &rule.body {
        CompiledBody::Constant(value) => Ok(*value),
        CompiledBody::Native(predicate) => {
            if rule.mode() == Mode::Resource && resource.is_none() {
                return Ok(false);
            }

            let qualified = rule.qualified_name();
            let context = RuleContext {
                rule: &qualified,
                subject,
                principal: scope.principal,
                resource: resource.map(|resource| &**resource),
                args: scope.args,
            };

            let message = match catch_unwind(AssertUnwindSafe(|| predicate(&context))) {
                Ok(Ok(allowed)) => return Ok(allowed),
                Ok(Err(err)) => format!("{err:#}"),
                Err(payload) => panic_message(payload.as_ref()),
            };
            Err(RuleExecutionError::new(qualified, BodyKind::Native, message, scope.capture_backtraces()).into())
        }
        CompiledBody::Condition(condition) => {
            let scope = Scope { resource, ..*scope };
            evaluate(condition.expr(), rule, mode, &scope)
        }
        CompiledBody::Delegate(_) => unreachable!("delegates are unwrapped by `call`"),
    }
}

/// Nested checks have no principal requirement of their own; an absent
/// principal makes them false.
fn nested(result: Result<bool>) -> Result<bool> {
    match result {
        Err(AuthzError::PrincipalRequired { .. }) => Ok(false),
        other => other,
    }
}

fn evaluate(expr: &Expr, rule: &Rule, mode: EvalMode, scope: &Scope<'_>) -> Result<bool> {
    match expr {
        Expr::Literal(literal) => Ok(literal.is_truthy()),
        Expr::Not(inner) => Ok(!evaluate(inner, rule, mode, scope)?),
        Expr::And(left, right) => Ok(evaluate(left, rule, mode, scope)? && evaluate(right, rule, mode, scope)?),
        Expr::Or(left, right) => Ok(evaluate(left, rule, mode, scope)? || evaluate(right, rule, mode, scope)?),
        Expr::Ref(name) => {
            let referenced = scope.class.predicate(name, mode)?;
            nested(call(&referenced, mode, scope))
        }
        Expr::FieldAccess(path) => match scope.resource {
            Some(resource) => Ok(follow(resource, path, rule, scope)?.is_some()),
            None => Ok(false),
        },
        Expr::RemoteRight(remote) => remote_right(remote, rule, scope),
    }
}

/// Follow `path` from `start`; `None` when a step is missing
fn follow(start: &ResourceRef, path: &[String], rule: &Rule, scope: &Scope<'_>) -> Result<Option<ResourceRef>> {
    let mut current = Arc::clone(start);
    for field in path {
        match current.related(field) {
            Ok(Some(next)) => current = next,
            Ok(None) => return Ok(None),
            Err(err) => {
                return Err(RuleExecutionError::new(
                    rule.qualified_name(),
                    BodyKind::Condition,
                    format!("failed to follow `{field}` from {} `{}`: {err:#}", current.resource_type(), current.resource_id()),
                    scope.capture_backtraces(),
                )
                .into())
            }
        }
    }
    Ok(Some(current))
}

fn remote_right(remote: &RemoteRight, rule: &Rule, scope: &Scope<'_>) -> Result<bool> {
    let max_depth = scope.table.config().max_remote_depth;
    if scope.depth >= max_depth {
        warn!(
            rule = %rule.qualified_name(),
            right = %remote.right,
            max_depth,
            "Remote right nesting limit reached, evaluating to false"
        );
        return Ok(false);
    }

    let Some(resource) = scope.resource else {
        return Ok(false);
    };
    let Some(target) = follow(resource, &remote.path, rule, scope)? else {
        return Ok(false);
    };

    let target_type = remote
        .target_type
        .as_deref()
        .unwrap_or_else(|| target.resource_type());
    let class = scope.table.class(target_type)?;

    let args = remote
        .args
        .iter()
        .map(|argument| evaluate_argument(argument, resource, rule, scope))
        .collect::<Result<Vec<_>>>()?;

    let target_rule = class.predicate(&remote.right, EvalMode::Dynamic)?;
    let remote_scope = Scope {
        table: scope.table,
        class: &class,
        principal: scope.principal,
        resource: Some(&target),
        args: &args,
        depth: scope.depth + 1,
    };
    nested(call(&target_rule, EvalMode::Dynamic, &remote_scope))
}

fn evaluate_argument(argument: &Argument, resource: &ResourceRef, rule: &Rule, scope: &Scope<'_>) -> Result<ArgValue> {
    let value = match argument {
        Argument::Path(path) => match follow(resource, path, rule, scope)? {
            Some(object) => ArgValue::Resource(object),
            None => ArgValue::Nil,
        },
        Argument::Literal(Literal::True) => ArgValue::Bool(true),
        Argument::Literal(Literal::False) => ArgValue::Bool(false),
        Argument::Literal(Literal::Nil) => ArgValue::Nil,
        Argument::Int(value) => ArgValue::Int(*value),
        Argument::Str(value) => ArgValue::Str(value.clone()),
        Argument::Symbol(value) => ArgValue::Symbol(value.clone()),
    };
    Ok(value)
}
