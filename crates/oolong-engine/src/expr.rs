//! Evaluable expressions.
//!
//! The SQL expression language lives outside the engine; what the engine
//! consumes is an evaluable node with `eval(env) -> Value`. This module
//! provides the minimal node set the catalog needs for `DEFAULT` values
//! and `CHECK` constraints, with a serialized form that round-trips
//! through the persistent catalog mirror.

use std::fmt;

use serde::{Deserialize, Serialize};

use oolong_common::types::{Document, Value};
use oolong_common::{Error, Result};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        };
        write!(f, "{s}")
    }
}

/// An evaluable expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A constant value.
    Literal(Value),
    /// A field path into the candidate document.
    Field(String),
    /// A comparison of two sub-expressions.
    Compare {
        /// The operator.
        op: CompareOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Shorthand for a literal node.
    #[must_use]
    pub fn literal(value: Value) -> Self {
        Expr::Literal(value)
    }

    /// Shorthand for a field reference.
    #[must_use]
    pub fn field(path: impl Into<String>) -> Self {
        Expr::Field(path.into())
    }

    /// Shorthand for a comparison node.
    #[must_use]
    pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Evaluates the expression against `env`.
    ///
    /// Comparisons involving NULL yield NULL; incomparable operands are
    /// an error.
    pub fn eval(&self, env: &Env<'_>) -> Result<Value> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field(path) => Ok(env.resolve(path).cloned().unwrap_or(Value::Null)),
            Expr::Compare { op, lhs, rhs } => {
                let left = lhs.eval(env)?;
                let right = rhs.eval(env)?;
                if left.is_null() || right.is_null() {
                    return Ok(Value::Null);
                }
                let ord = left.compare(&right).ok_or_else(|| {
                    Error::invalid(format!(
                        "cannot compare {} with {}",
                        left.value_type(),
                        right.value_type()
                    ))
                })?;
                let result = match op {
                    CompareOp::Eq => ord.is_eq(),
                    CompareOp::Neq => !ord.is_eq(),
                    CompareOp::Lt => ord.is_lt(),
                    CompareOp::Lte => ord.is_le(),
                    CompareOp::Gt => ord.is_gt(),
                    CompareOp::Gte => ord.is_ge(),
                };
                Ok(Value::Bool(result))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Field(path) => write!(f, "{path}"),
            Expr::Compare { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
        }
    }
}

/// Evaluation environment: the candidate document.
#[derive(Debug)]
pub struct Env<'a> {
    doc: &'a Document,
}

impl<'a> Env<'a> {
    /// Wraps a document for evaluation.
    #[must_use]
    pub fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    /// Resolves a dotted field path.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        resolve_path(self.doc, path)
    }
}

/// Resolves a dotted field path inside `doc`.
#[must_use]
pub fn resolve_path<'d>(doc: &'d Document, path: &str) -> Option<&'d Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        match current {
            Value::Document(sub) => current = sub.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Sets a dotted field path inside `doc`, creating intermediate
/// documents for missing segments. Overwriting a non-document value
/// with a deeper path is an error.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<()> {
    if path.is_empty() {
        return Err(Error::invalid("empty field path"));
    }
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if head.is_empty() || rest.is_empty() {
                return Err(Error::invalid(format!("invalid field path '{path}'")));
            }
            match doc.get(head) {
                None => doc.insert(head, Value::Document(Document::new())),
                Some(Value::Document(_)) => {}
                Some(_) => {
                    return Err(Error::invalid(format!(
                        "field '{head}' is not a document"
                    )));
                }
            }
            match doc.get_mut(head) {
                Some(Value::Document(sub)) => set_path(sub, rest, value),
                _ => Err(Error::invalid(format!("field '{head}' is not a document"))),
            }
        }
    }
}
