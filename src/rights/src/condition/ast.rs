//! Condition syntax tree

use std::fmt;

/// Reserved rule `self` compiles to: "the resource is the current principal"
pub const CURRENT_PRINCIPAL: &str = "__current_principal__";

/// Boolean condition over rules of one resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `true`, `false` or `nil`
    Literal(Literal),

    /// Reference to a relation or right of the same resource type
    Ref(String),

    /// Negation
    Not(Box<Expr>),

    /// Conjunction (short-circuits)
    And(Box<Expr>, Box<Expr>),

    /// Disjunction (short-circuits)
    Or(Box<Expr>, Box<Expr>),

    /// `course.term`: true when every step of the path is present
    FieldAccess(Vec<String>),

    /// `right: path` or `type.right(path, args...)`
    RemoteRight(RemoteRight),
}

/// Literal values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    True,
    False,
    Nil,
}

impl Literal {
    pub fn is_truthy(self) -> bool {
        matches!(self, Literal::True)
    }
}

/// Right evaluated against the policy of an object reached from the resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRight {
    /// Explicit target type; `None` uses the type of the reached object
    pub target_type: Option<String>,

    /// Right name on the target type
    pub right: String,

    /// Path followed from the current resource; empty for `self`
    pub path: Vec<String>,

    /// Extra arguments passed to the target rule
    pub args: Vec<Argument>,
}

/// Extra argument of a typed remote right
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// Object path from the current resource (`self` is the empty path)
    Path(Vec<String>),
    Literal(Literal),
    Int(i64),
    Str(String),
    /// `:draft`
    Symbol(String),
}

impl Expr {
    pub(crate) fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    pub(crate) fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub(crate) fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    /// Rule names referenced locally, in first-occurrence order
    pub fn references(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references(&self, names: &mut Vec<String>) {
        match self {
            Expr::Ref(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Expr::Not(inner) => inner.collect_references(names),
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_references(names);
                right.collect_references(names);
            }
            Expr::Literal(_) | Expr::FieldAccess(_) | Expr::RemoteRight(_) => {}
        }
    }

    /// Whether the expression cannot be evaluated without a resource
    pub fn needs_resource(&self) -> bool {
        match self {
            Expr::FieldAccess(_) | Expr::RemoteRight(_) => true,
            Expr::Ref(name) => name == CURRENT_PRINCIPAL,
            Expr::Not(inner) => inner.needs_resource(),
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.needs_resource() || right.needs_resource()
            }
            Expr::Literal(_) => false,
        }
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &[String]) -> fmt::Result {
    if path.is_empty() {
        f.write_str("self")
    } else {
        f.write_str(&path.join("."))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::True => f.write_str("true"),
            Literal::False => f.write_str("false"),
            Literal::Nil => f.write_str("nil"),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Path(path) => write_path(f, path),
            Argument::Literal(literal) => write!(f, "{literal}"),
            Argument::Int(value) => write!(f, "{value}"),
            Argument::Str(value) => write!(f, "{value:?}"),
            Argument::Symbol(value) => write!(f, ":{value}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(literal) => write!(f, "{literal}"),
            Expr::Ref(name) if name == CURRENT_PRINCIPAL => f.write_str("self"),
            Expr::Ref(name) => f.write_str(name),
            Expr::Not(inner) => write!(f, "not {inner}"),
            Expr::And(left, right) => write!(f, "({left} and {right})"),
            Expr::Or(left, right) => write!(f, "({left} or {right})"),
            Expr::FieldAccess(path) => f.write_str(&path.join(".")),
            Expr::RemoteRight(remote) => match &remote.target_type {
                Some(target) => {
                    write!(f, "{target}.{}(", remote.right)?;
                    write_path(f, &remote.path)?;
                    for arg in &remote.args {
                        write!(f, ", {arg}")?;
                    }
                    f.write_str(")")
                }
                None => {
                    write!(f, "{}: ", remote.right)?;
                    write_path(f, &remote.path)
                }
            },
        }
    }
}
