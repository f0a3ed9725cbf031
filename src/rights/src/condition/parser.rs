//! Recursive-descent parser for rule conditions
//!
//! Grammar:
//!
//! ```text
//! condition := ("if" | "unless")? or_expr
//! or_expr   := and_expr (("or" | "||") and_expr)*
//! and_expr  := unary (("and" | "&&") unary)*
//! unary     := ("not" | "!") unary | primary
//! primary   := "(" or_expr ")" | "true" | "false" | "nil" | "self"
//!            | IDENT ":" path                              remote right
//!            | IDENT "." IDENT "(" path ("," arg)* ")"      typed remote right
//!            | IDENT ("." IDENT)+                          field access
//!            | IDENT                                       rule reference
//! path      := "self" | IDENT ("." IDENT)*
//! arg       := path | ":" IDENT | INT | STRING | "true" | "false" | "nil"
//! ```

use super::ast::{Argument, Expr, Literal, RemoteRight, CURRENT_PRINCIPAL};
use crate::error::ConfigurationError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    And,
    Or,
    Not,
    True,
    False,
    Nil,
    SelfRef,
    If,
    Unless,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "identifier `{name}`"),
            Token::Int(value) => write!(f, "integer `{value}`"),
            Token::Str(value) => write!(f, "string {value:?}"),
            Token::Dot => f.write_str("`.`"),
            Token::Comma => f.write_str("`,`"),
            Token::Colon => f.write_str("`:`"),
            Token::LParen => f.write_str("`(`"),
            Token::RParen => f.write_str("`)`"),
            Token::And => f.write_str("`and`"),
            Token::Or => f.write_str("`or`"),
            Token::Not => f.write_str("`not`"),
            Token::True => f.write_str("`true`"),
            Token::False => f.write_str("`false`"),
            Token::Nil => f.write_str("`nil`"),
            Token::SelfRef => f.write_str("`self`"),
            Token::If => f.write_str("`if`"),
            Token::Unless => f.write_str("`unless`"),
        }
    }
}

fn keyword(word: &str) -> Option<Token> {
    let token = match word {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" => Token::True,
        "false" => Token::False,
        "nil" => Token::Nil,
        "self" => Token::SelfRef,
        "if" => Token::If,
        "unless" => Token::Unless,
        _ => return None,
    };
    Some(token)
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            quote @ ('"' | '\'') => {
                i += 1;
                let mut value = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                value.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(c) if *c == quote => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            value.push(*c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let value = digits
                    .parse()
                    .map_err(|_| format!("integer `{digits}` is out of range"))?;
                tokens.push(Token::Int(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if chars.get(i) == Some(&'?') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(keyword(&word).unwrap_or(Token::Ident(word)));
            }
            c => return Err(format!("unexpected character `{c}`")),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {expected}, found {token}")),
            None => Err(format!("expected {expected}, found end of condition")),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            Some(token) => Err(format!("expected {what}, found {token}")),
            None => Err(format!("expected {what}, found end of condition")),
        }
    }

    fn parse_condition(&mut self) -> Result<Expr, String> {
        let negate = match self.peek() {
            Some(Token::If) => {
                self.pos += 1;
                false
            }
            Some(Token::Unless) => {
                self.pos += 1;
                true
            }
            _ => false,
        };

        if self.peek().is_none() {
            return Err("empty condition".to_string());
        }

        let expr = self.parse_or()?;
        if let Some(token) = self.peek() {
            return Err(format!("unexpected {token} after expression"));
        }

        Ok(if negate { Expr::not(expr) } else { expr })
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        while self.eat(&Token::And) {
            let right = self.parse_unary()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Not) {
            return Ok(Expr::not(self.parse_unary()?));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::True) => Ok(Expr::Literal(Literal::True)),
            Some(Token::False) => Ok(Expr::Literal(Literal::False)),
            Some(Token::Nil) => Ok(Expr::Literal(Literal::Nil)),
            Some(Token::SelfRef) => Ok(Expr::Ref(CURRENT_PRINCIPAL.to_string())),
            Some(Token::Ident(name)) => self.parse_reference(name),
            Some(token) => Err(format!("unexpected {token}")),
            None => Err("unexpected end of condition".to_string()),
        }
    }

    fn parse_reference(&mut self, name: String) -> Result<Expr, String> {
        if self.eat(&Token::Colon) {
            let path = self.parse_path()?;
            return Ok(Expr::RemoteRight(RemoteRight {
                target_type: None,
                right: name,
                path,
                args: Vec::new(),
            }));
        }

        if self.peek() != Some(&Token::Dot) {
            return Ok(Expr::Ref(name));
        }

        let mut segments = vec![name];
        while self.eat(&Token::Dot) {
            segments.push(self.ident("field name")?);
        }

        if self.eat(&Token::LParen) {
            if segments.len() != 2 {
                return Err(format!(
                    "remote right must be written `type.right(...)`, found `{}(`",
                    segments.join(".")
                ));
            }
            let path = self.parse_path()?;
            let mut args = Vec::new();
            while self.eat(&Token::Comma) {
                args.push(self.parse_argument()?);
            }
            self.expect(&Token::RParen)?;

            let right = segments.pop().unwrap_or_default();
            let target_type = segments.pop();
            return Ok(Expr::RemoteRight(RemoteRight {
                target_type,
                right,
                path,
                args,
            }));
        }

        Ok(Expr::FieldAccess(segments))
    }

    fn parse_path(&mut self) -> Result<Vec<String>, String> {
        if self.eat(&Token::SelfRef) {
            return Ok(Vec::new());
        }
        let mut path = vec![self.ident("object path")?];
        while self.eat(&Token::Dot) {
            path.push(self.ident("field name")?);
        }
        Ok(path)
    }

    fn parse_argument(&mut self) -> Result<Argument, String> {
        match self.peek() {
            Some(Token::Colon) => {
                self.pos += 1;
                Ok(Argument::Symbol(self.ident("symbol name")?))
            }
            Some(Token::Int(value)) => {
                let value = *value;
                self.pos += 1;
                Ok(Argument::Int(value))
            }
            Some(Token::Str(value)) => {
                let value = value.clone();
                self.pos += 1;
                Ok(Argument::Str(value))
            }
            Some(Token::True) => {
                self.pos += 1;
                Ok(Argument::Literal(Literal::True))
            }
            Some(Token::False) => {
                self.pos += 1;
                Ok(Argument::Literal(Literal::False))
            }
            Some(Token::Nil) => {
                self.pos += 1;
                Ok(Argument::Literal(Literal::Nil))
            }
            _ => Ok(Argument::Path(self.parse_path()?)),
        }
    }
}

/// Parse a condition string into an expression tree.
///
/// Purely syntactic: referenced names are resolved when rules are classified.
pub fn parse(source: &str) -> Result<Expr, ConfigurationError> {
    let invalid = |message: String| ConfigurationError::InvalidCondition {
        condition: source.to_string(),
        message,
    };

    let tokens = tokenize(source).map_err(invalid)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_condition().map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn r(name: &str) -> Expr {
        Expr::Ref(name.to_string())
    }

    #[test]
    fn test_parse_simple_disjunction() {
        let expr = parse("if owner or administrator").unwrap();
        assert_eq!(expr, Expr::or(r("owner"), r("administrator")));
    }

    #[test]
    fn test_unless_negates() {
        let expr = parse("unless locked").unwrap();
        assert_eq!(expr, Expr::not(r("locked")));
    }

    #[test]
    fn test_precedence_and_symbols() {
        let expr = parse("a || b && !c").unwrap();
        assert_eq!(expr, Expr::or(r("a"), Expr::and(r("b"), Expr::not(r("c")))));

        let grouped = parse("(a or b) and c").unwrap();
        assert_eq!(grouped, Expr::and(Expr::or(r("a"), r("b")), r("c")));
    }

    #[test]
    fn test_literals_and_self() {
        assert_eq!(parse("true").unwrap(), Expr::Literal(Literal::True));
        assert_eq!(parse("if nil").unwrap(), Expr::Literal(Literal::Nil));
        assert_eq!(parse("self").unwrap(), r(CURRENT_PRINCIPAL));
    }

    #[test]
    fn test_question_mark_identifiers() {
        assert_eq!(parse("if may_edit?").unwrap(), r("may_edit?"));
    }

    #[test]
    fn test_remote_right() {
        let expr = parse("if corrector: assignment.course").unwrap();
        assert_eq!(
            expr,
            Expr::RemoteRight(RemoteRight {
                target_type: None,
                right: "corrector".to_string(),
                path: vec!["assignment".to_string(), "course".to_string()],
                args: Vec::new(),
            })
        );
    }

    #[test]
    fn test_typed_remote_right_with_arguments() {
        let expr = parse("if course.grade(assignment.course, :final, 3, 'x', nil) or owner").unwrap();
        let Expr::Or(left, right) = expr else {
            panic!("expected disjunction");
        };
        assert_eq!(*right, r("owner"));
        assert_eq!(
            *left,
            Expr::RemoteRight(RemoteRight {
                target_type: Some("course".to_string()),
                right: "grade".to_string(),
                path: vec!["assignment".to_string(), "course".to_string()],
                args: vec![
                    Argument::Symbol("final".to_string()),
                    Argument::Int(3),
                    Argument::Str("x".to_string()),
                    Argument::Literal(Literal::Nil),
                ],
            })
        );
    }

    #[test]
    fn test_remote_right_on_self() {
        let expr = parse("course.show(self)").unwrap();
        let Expr::RemoteRight(remote) = expr else {
            panic!("expected remote right");
        };
        assert!(remote.path.is_empty());
    }

    #[test]
    fn test_field_access() {
        assert_eq!(
            parse("if course.term").unwrap(),
            Expr::FieldAccess(vec!["course".to_string(), "term".to_string()])
        );
    }

    #[test]
    fn test_syntax_errors() {
        for source in ["", "if", "owner or", "(owner", "owner )", "a & b", "a.b.c(self)", "x: ", "'open"] {
            let err = parse(source).unwrap_err();
            assert!(
                matches!(err, ConfigurationError::InvalidCondition { .. }),
                "`{source}` should not parse"
            );
        }
    }

    fn identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z_]{0,7}".prop_filter("keywords are not identifiers", |name| keyword(name).is_none())
    }

    proptest! {
        #[test]
        fn test_and_binds_tighter_than_or(a in identifier(), b in identifier(), c in identifier()) {
            let expr = parse(&format!("{a} or {b} and {c}")).unwrap();
            prop_assert_eq!(expr, Expr::or(r(&a), Expr::and(r(&b), r(&c))));
        }

        #[test]
        fn test_keyword_and_symbol_operators_agree(a in identifier(), b in identifier()) {
            prop_assert_eq!(parse(&format!("{a} and not {b}")).unwrap(), parse(&format!("{a} && !{b}")).unwrap());
            prop_assert_eq!(parse(&format!("if {a} or {b}")).unwrap(), parse(&format!("{a} || {b}")).unwrap());
        }
    }
}
