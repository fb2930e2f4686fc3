// Expression Evaluator
// Interprets the parsed tree against caller state, tracing every coercion

use crate::parser::{Expression, FunctionDef, Node};
use crate::trace::TraceWriter;
use crate::value::{format_number, ConvertError, Kind, Value, Version};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use std::any::Any;
use std::sync::Arc;

/// Per-evaluation context: a trace sink and the embedder's opaque state.
///
/// A parsed [`Expression`] is immutable and may be evaluated from multiple
/// threads concurrently provided each evaluation uses its own context.
pub struct EvaluationContext<'a> {
    pub trace: &'a mut dyn TraceWriter,
    pub state: Option<&'a dyn Any>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(trace: &'a mut dyn TraceWriter, state: Option<&'a dyn Any>) -> Self {
        Self { trace, state }
    }

    fn trace_line(&mut self, depth: usize, message: &str) {
        let mut line = String::with_capacity(depth * 2 + message.len());
        for _ in 0..depth {
            line.push_str("  ");
        }
        line.push_str(message);
        self.trace.verbose(&line);
    }

    fn trace_coerced(&mut self, depth: usize, kind: Kind, rendered: &str) {
        self.trace_line(depth, &format!("=> ({}) {}", kind, rendered));
    }

    fn trace_coercion_failed(&mut self, depth: usize, from: Kind, to: Kind) {
        self.trace_line(depth, &format!("=> Unable to coerce {} to {}.", from, to));
    }

    /// Boolean coercion is total.
    pub(crate) fn coerce_boolean(&mut self, value: &Value, depth: usize) -> bool {
        let result = value.to_boolean();
        self.trace_coerced(depth, Kind::Boolean, if result { "True" } else { "False" });
        result
    }

    pub(crate) fn coerce_number(&mut self, value: &Value, depth: usize) -> Option<Decimal> {
        match value.try_to_number() {
            Some(number) => {
                self.trace_coerced(depth, Kind::Number, &format_number(&number));
                Some(number)
            }
            None => {
                self.trace_coercion_failed(depth, value.kind(), Kind::Number);
                None
            }
        }
    }

    pub(crate) fn coerce_string(&mut self, value: &Value, depth: usize) -> Option<String> {
        match value.try_to_string() {
            Some(string) => {
                self.trace_coerced(depth, Kind::String, &string);
                Some(string)
            }
            None => {
                self.trace_coercion_failed(depth, value.kind(), Kind::String);
                None
            }
        }
    }

    pub(crate) fn coerce_version(&mut self, value: &Value, depth: usize) -> Option<Version> {
        match value.try_to_version() {
            Some(version) => {
                self.trace_coerced(depth, Kind::Version, &version.to_string());
                Some(version)
            }
            None => {
                self.trace_coercion_failed(depth, value.kind(), Kind::Version);
                None
            }
        }
    }

    pub(crate) fn demand_number(
        &mut self,
        value: &Value,
        depth: usize,
    ) -> Result<Decimal, ConvertError> {
        self.coerce_number(value, depth)
            .ok_or_else(|| ConvertError::new(value.clone(), Kind::Number))
    }

    pub(crate) fn demand_string(
        &mut self,
        value: &Value,
        depth: usize,
    ) -> Result<String, ConvertError> {
        self.coerce_string(value, depth)
            .ok_or_else(|| ConvertError::new(value.clone(), Kind::String))
    }

    pub(crate) fn demand_version(
        &mut self,
        value: &Value,
        depth: usize,
    ) -> Result<Version, ConvertError> {
        self.coerce_version(value, depth)
            .ok_or_else(|| ConvertError::new(value.clone(), Kind::Version))
    }
}

impl Node {
    /// Evaluate this subtree. `depth` drives trace indentation only.
    pub(crate) fn evaluate_at(
        &self,
        context: &mut EvaluationContext<'_>,
        depth: usize,
    ) -> Result<Value, ConvertError> {
        match self {
            Node::Leaf(value) => Ok(value.clone()),
            Node::Indexer { children } => evaluate_indexer(children, context, depth),
            Node::Function { function, children } => match function {
                FunctionDef::Builtin(builtin) => builtin.evaluate(children, context, depth),
                FunctionDef::Extension(extension) => {
                    let mut arguments = Vec::with_capacity(children.len());
                    for child in children {
                        arguments.push(child.evaluate_at(context, depth + 1)?);
                    }
                    (extension.body)(&arguments, context)
                }
            },
        }
    }
}

fn evaluate_indexer(
    children: &[Node],
    context: &mut EvaluationContext<'_>,
    depth: usize,
) -> Result<Value, ConvertError> {
    let target = children[0].evaluate_at(context, depth + 1)?;
    let index = children[1].evaluate_at(context, depth + 1)?;
    let result = match &target {
        Value::Array(items) => index_array(items, &index, context, depth),
        Value::Object(fields) => match context.coerce_string(&index, depth + 1) {
            Some(key) => fields.get(&key).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        },
        _ => Value::Null,
    };
    Ok(result)
}

/// Array indexing tolerates bad indices: anything that is not a
/// non-negative in-range integer yields Null.
fn index_array(
    items: &Arc<Vec<Value>>,
    index: &Value,
    context: &mut EvaluationContext<'_>,
    depth: usize,
) -> Value {
    let number = match index {
        Value::Number(n) => Some(*n),
        Value::String(s) if !s.is_empty() => context.coerce_number(index, depth + 1),
        _ => None,
    };
    let Some(number) = number else {
        return Value::Null;
    };
    if number < Decimal::ZERO || !number.fract().is_zero() {
        return Value::Null;
    }
    let Some(position) = number.to_usize() else {
        return Value::Null;
    };
    items.get(position).cloned().unwrap_or(Value::Null)
}

impl Expression {
    /// Evaluate the tree to a value. The empty expression yields Null.
    pub fn evaluate(&self, context: &mut EvaluationContext<'_>) -> Result<Value, ConvertError> {
        match self.root() {
            Some(node) => node.evaluate_at(context, 0),
            None => Ok(Value::Null),
        }
    }

    /// Evaluate and coerce the result to Boolean. The coercion itself is
    /// total, but children reached during evaluation may still fail a
    /// demand-conversion.
    pub fn evaluate_boolean(
        &self,
        context: &mut EvaluationContext<'_>,
    ) -> Result<bool, ConvertError> {
        let value = self.evaluate(context)?;
        Ok(context.coerce_boolean(&value, 0))
    }

    pub fn evaluate_number(
        &self,
        context: &mut EvaluationContext<'_>,
    ) -> Result<Decimal, ConvertError> {
        let value = self.evaluate(context)?;
        context.demand_number(&value, 0)
    }

    pub fn evaluate_string(
        &self,
        context: &mut EvaluationContext<'_>,
    ) -> Result<String, ConvertError> {
        let value = self.evaluate(context)?;
        context.demand_string(&value, 0)
    }

    pub fn evaluate_version(
        &self,
        context: &mut EvaluationContext<'_>,
    ) -> Result<Version, ConvertError> {
        let value = self.evaluate(context)?;
        context.demand_version(&value, 0)
    }
}
