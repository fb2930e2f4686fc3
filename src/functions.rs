// Built-in Functions
// Names, arities, and evaluation semantics for the function vocabulary

use crate::evaluator::EvaluationContext;
use crate::parser::Node;
use crate::value::{cmp_ignore_ascii_case, ConvertError, Kind, Value};

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A parameter count with no upper bound.
pub const UNBOUNDED: usize = usize::MAX;

/// The built-in function vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    And,
    Or,
    Not,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
}

impl Builtin {
    pub const ALL: [Builtin; 15] = [
        Builtin::And,
        Builtin::Or,
        Builtin::Not,
        Builtin::Xor,
        Builtin::Eq,
        Builtin::Ne,
        Builtin::Lt,
        Builtin::Le,
        Builtin::Gt,
        Builtin::Ge,
        Builtin::In,
        Builtin::NotIn,
        Builtin::Contains,
        Builtin::StartsWith,
        Builtin::EndsWith,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::And => "and",
            Builtin::Or => "or",
            Builtin::Not => "not",
            Builtin::Xor => "xor",
            Builtin::Eq => "eq",
            Builtin::Ne => "ne",
            Builtin::Lt => "lt",
            Builtin::Le => "le",
            Builtin::Gt => "gt",
            Builtin::Ge => "ge",
            Builtin::In => "in",
            Builtin::NotIn => "notIn",
            Builtin::Contains => "contains",
            Builtin::StartsWith => "startsWith",
            Builtin::EndsWith => "endsWith",
        }
    }

    /// Case-insensitive name lookup.
    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL
            .into_iter()
            .find(|builtin| builtin.name().eq_ignore_ascii_case(name))
    }

    /// `(min, max)` parameter counts; `max` may be [`UNBOUNDED`].
    pub fn arity(self) -> (usize, usize) {
        match self {
            Builtin::Not => (1, 1),
            Builtin::Xor
            | Builtin::Eq
            | Builtin::Ne
            | Builtin::Lt
            | Builtin::Le
            | Builtin::Gt
            | Builtin::Ge
            | Builtin::Contains
            | Builtin::StartsWith
            | Builtin::EndsWith => (2, 2),
            Builtin::And | Builtin::Or | Builtin::In | Builtin::NotIn => (2, UNBOUNDED),
        }
    }

    pub(crate) fn evaluate(
        self,
        children: &[Node],
        context: &mut EvaluationContext<'_>,
        depth: usize,
    ) -> Result<Value, ConvertError> {
        match self {
            // =============================================================
            // Logical functions
            // =============================================================
            Builtin::And => {
                for child in children {
                    let value = child.evaluate_at(context, depth + 1)?;
                    if !context.coerce_boolean(&value, depth + 1) {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            Builtin::Or => {
                for child in children {
                    let value = child.evaluate_at(context, depth + 1)?;
                    if context.coerce_boolean(&value, depth + 1) {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            Builtin::Not => {
                let value = children[0].evaluate_at(context, depth + 1)?;
                Ok(Value::Boolean(!context.coerce_boolean(&value, depth + 1)))
            }
            Builtin::Xor => {
                let left = children[0].evaluate_at(context, depth + 1)?;
                let right = children[1].evaluate_at(context, depth + 1)?;
                let left = context.coerce_boolean(&left, depth + 1);
                let right = context.coerce_boolean(&right, depth + 1);
                Ok(Value::Boolean(left ^ right))
            }

            // =============================================================
            // Equality and membership
            // =============================================================
            Builtin::Eq | Builtin::Ne => {
                let left = children[0].evaluate_at(context, depth + 1)?;
                let right = children[1].evaluate_at(context, depth + 1)?;
                let equal = values_equal(context, depth + 1, &left, &right);
                Ok(Value::Boolean(if self == Builtin::Eq { equal } else { !equal }))
            }
            Builtin::In | Builtin::NotIn => {
                let needle = children[0].evaluate_at(context, depth + 1)?;
                let mut found = false;
                for candidate in &children[1..] {
                    let value = candidate.evaluate_at(context, depth + 1)?;
                    if values_equal(context, depth + 1, &needle, &value) {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Boolean(if self == Builtin::In { found } else { !found }))
            }

            // =============================================================
            // Ordering
            // =============================================================
            Builtin::Lt | Builtin::Le | Builtin::Gt | Builtin::Ge => {
                let left = children[0].evaluate_at(context, depth + 1)?;
                let right = children[1].evaluate_at(context, depth + 1)?;
                let ordering = compare_values(context, depth + 1, &left, &right)?;
                let result = match self {
                    Builtin::Lt => ordering == Ordering::Less,
                    Builtin::Le => ordering != Ordering::Greater,
                    Builtin::Gt => ordering == Ordering::Greater,
                    Builtin::Ge => ordering != Ordering::Less,
                    _ => unreachable!(),
                };
                Ok(Value::Boolean(result))
            }

            // =============================================================
            // String functions
            // =============================================================
            Builtin::Contains | Builtin::StartsWith | Builtin::EndsWith => {
                let left = children[0].evaluate_at(context, depth + 1)?;
                let right = children[1].evaluate_at(context, depth + 1)?;
                let haystack = context.demand_string(&left, depth + 1)?.to_ascii_lowercase();
                let needle = context.demand_string(&right, depth + 1)?.to_ascii_lowercase();
                let result = match self {
                    Builtin::Contains => haystack.contains(&needle),
                    Builtin::StartsWith => haystack.starts_with(&needle),
                    Builtin::EndsWith => haystack.ends_with(&needle),
                    _ => unreachable!(),
                };
                Ok(Value::Boolean(result))
            }
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Equality casts the right operand toward the left operand's kind; a failed
/// cast means the values are unequal, never an error.
pub(crate) fn values_equal(
    context: &mut EvaluationContext<'_>,
    depth: usize,
    left: &Value,
    right: &Value,
) -> bool {
    match left {
        Value::Boolean(l) => context.coerce_boolean(right, depth) == *l,
        Value::Number(l) => context
            .coerce_number(right, depth)
            .is_some_and(|r| *l == r),
        Value::String(l) => context
            .coerce_string(right, depth)
            .is_some_and(|r| l.eq_ignore_ascii_case(&r)),
        Value::Version(l) => context
            .coerce_version(right, depth)
            .is_some_and(|r| *l == r),
        Value::Array(l) => matches!(right, Value::Array(r) if Arc::ptr_eq(l, r)),
        Value::Object(l) => matches!(right, Value::Object(r) if Arc::ptr_eq(l, r)),
        Value::Null => right.kind() == Kind::Null,
    }
}

/// Ordering normalizes the left operand first: the four ordered kinds are
/// used directly, anything else is demand-converted to Number. The right
/// operand is then demand-converted to the left's kind.
pub(crate) fn compare_values(
    context: &mut EvaluationContext<'_>,
    depth: usize,
    left: &Value,
    right: &Value,
) -> Result<Ordering, ConvertError> {
    let left = match left.kind() {
        Kind::Boolean | Kind::Number | Kind::String | Kind::Version => left.clone(),
        _ => Value::Number(context.demand_number(left, depth)?),
    };
    match &left {
        Value::Boolean(l) => {
            let r = context.coerce_boolean(right, depth);
            Ok(l.cmp(&r))
        }
        Value::Number(l) => {
            let r = context.demand_number(right, depth)?;
            Ok(l.cmp(&r))
        }
        Value::String(l) => {
            let r = context.demand_string(right, depth)?;
            Ok(cmp_ignore_ascii_case(l, &r))
        }
        Value::Version(l) => {
            let r = context.demand_version(right, depth)?;
            Ok(l.cmp(&r))
        }
        _ => unreachable!("left operand is normalized to an ordered kind"),
    }
}
