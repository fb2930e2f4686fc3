// Expression Parser
// Builds an AST from the token stream, enforcing grammar and arities

use crate::extensions::{ExtensionFunction, ExtensionRegistry};
use crate::functions::Builtin;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::trace::TraceWriter;
use crate::value::Value;

use std::fmt;
use std::sync::Arc;

/// A node of the parsed expression tree.
///
/// The tree is immutable after parsing; evaluation only reads it. An
/// `Indexer` always has exactly two children (target and index expression)
/// once parsing completes, and a `Function` node's child count stays within
/// its declared arity.
#[derive(Debug, Clone)]
pub enum Node {
    Leaf(Value),
    Indexer { children: Vec<Node> },
    Function { function: FunctionDef, children: Vec<Node> },
}

impl Node {
    fn children_mut(&mut self) -> &mut Vec<Node> {
        match self {
            Node::Indexer { children } | Node::Function { children, .. } => children,
            Node::Leaf(_) => unreachable!("leaf nodes have no children"),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Leaf(a), Node::Leaf(b)) => a == b,
            (Node::Indexer { children: a }, Node::Indexer { children: b }) => a == b,
            (
                Node::Function { function: fa, children: a },
                Node::Function { function: fb, children: b },
            ) => fa == fb && a == b,
            _ => false,
        }
    }
}

/// The function a [`Node::Function`] invokes.
#[derive(Debug, Clone)]
pub enum FunctionDef {
    Builtin(Builtin),
    Extension(Arc<ExtensionFunction>),
}

impl FunctionDef {
    pub fn name(&self) -> &str {
        match self {
            FunctionDef::Builtin(builtin) => builtin.name(),
            FunctionDef::Extension(extension) => &extension.name,
        }
    }

    /// Declared `(min, max)` parameter counts.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            FunctionDef::Builtin(builtin) => builtin.arity(),
            FunctionDef::Extension(extension) => {
                (extension.min_parameters, extension.max_parameters)
            }
        }
    }
}

impl PartialEq for FunctionDef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FunctionDef::Builtin(a), FunctionDef::Builtin(b)) => a == b,
            (FunctionDef::Extension(a), FunctionDef::Extension(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A parsed expression, ready for repeated evaluation.
///
/// The empty expression is legal and has no root; it evaluates to Null.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub(crate) root: Option<Node>,
}

impl Expression {
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    ExpectedPropertyName,
    ExpectedStartParameter,
    UnclosedFunction,
    UnclosedIndexer,
    UnexpectedSymbol,
    UnrecognizedValue,
}

impl ParseErrorKind {
    fn description(self) -> &'static str {
        match self {
            ParseErrorKind::ExpectedPropertyName => {
                "Expected property name to follow dereference operator"
            }
            ParseErrorKind::ExpectedStartParameter => "Expected '(' to follow function",
            ParseErrorKind::UnclosedFunction => "Unclosed function",
            ParseErrorKind::UnclosedIndexer => "Unclosed indexer",
            ParseErrorKind::UnexpectedSymbol => "Unexpected symbol",
            ParseErrorKind::UnrecognizedValue => "Unrecognized value",
        }
    }
}

/// Fatal grammar error. Carries the offending token and the raw expression
/// so the embedder can render a precise diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Source text of the offending token.
    pub raw_token: String,
    /// Zero-based byte offset of the offending token.
    pub token_index: usize,
    pub token_length: usize,
    /// The complete raw expression.
    pub expression: String,
}

impl ParseError {
    fn new(kind: ParseErrorKind, token: &Token, raw: &str) -> Self {
        Self {
            kind,
            raw_token: token.raw(raw).to_string(),
            token_index: token.index,
            token_length: token.length,
            expression: raw.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: '{}'. Located at position {} within condition expression: {}",
            self.kind.description(),
            self.raw_token,
            self.token_index + 1,
            self.expression
        )
    }
}

impl std::error::Error for ParseError {}

/// Parse a raw condition expression against a set of registered extensions.
pub fn parse(
    raw: &str,
    trace: &mut dyn TraceWriter,
    extensions: &ExtensionRegistry,
) -> Result<Expression, ParseError> {
    trace.verbose(&format!("Parsing expression: {}", raw));
    Parser {
        raw,
        lexer: Lexer::new(raw, extensions),
        stack: Vec::new(),
        root: None,
        previous: None,
    }
    .run()
}

/// An open function or indexer. The opening token is kept for unclosed
/// diagnostics at end of stream.
struct Container {
    node: Node,
    token: Token,
}

struct Parser<'a> {
    raw: &'a str,
    lexer: Lexer<'a>,
    stack: Vec<Container>,
    root: Option<Node>,
    previous: Option<Token>,
}

impl Parser<'_> {
    fn run(mut self) -> Result<Expression, ParseError> {
        while let Some(token) = self.lexer.try_next() {
            match &token.kind {
                TokenKind::Boolean(_)
                | TokenKind::Number(_)
                | TokenKind::Version(_)
                | TokenKind::String(_) => self.handle_literal(token)?,
                TokenKind::Function(_) | TokenKind::Extension(_) => {
                    self.handle_function(token)?
                }
                TokenKind::StartIndex => self.handle_start_index(token)?,
                TokenKind::Dereference => self.handle_dereference(token)?,
                TokenKind::EndIndex => self.handle_end_index(token)?,
                TokenKind::EndParameter => self.handle_end_parameter(token)?,
                TokenKind::Separator => self.handle_separator(token)?,
                // '(' is consumed by the function lookahead and a property
                // name by the dereference lookahead; anywhere else they are
                // out of place.
                TokenKind::StartParameter | TokenKind::PropertyName(_) => {
                    return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
                }
                TokenKind::Unrecognized => {
                    return Err(self.error(ParseErrorKind::UnrecognizedValue, &token));
                }
            }
        }

        if let Some(container) = self.stack.last() {
            let kind = match container.node {
                Node::Function { .. } => ParseErrorKind::UnclosedFunction,
                _ => ParseErrorKind::UnclosedIndexer,
            };
            return Err(self.error(kind, &container.token));
        }

        Ok(Expression { root: self.root })
    }

    /// Literals and function names may only open the whole expression or
    /// follow `[`, `(`, or `,`.
    fn value_position_ok(&self) -> bool {
        match &self.previous {
            None => true,
            Some(token) => matches!(
                token.kind,
                TokenKind::Separator | TokenKind::StartIndex | TokenKind::StartParameter
            ),
        }
    }

    /// `[` and `.` may only follow something that yields an indexable
    /// result: a closed call, a closed indexer, or a property name.
    fn indexable_position(&self) -> bool {
        match &self.previous {
            None => false,
            Some(token) => matches!(
                token.kind,
                TokenKind::EndParameter | TokenKind::EndIndex | TokenKind::PropertyName(_)
            ),
        }
    }

    /// Attach a completed expression to the innermost open container, or
    /// make it the root when none is open.
    fn push_expression(&mut self, node: Node) {
        if let Some(container) = self.stack.last_mut() {
            container.node.children_mut().push(node);
        } else {
            self.root = Some(node);
        }
    }

    /// Detach the most recent completed expression so it can become an
    /// indexer target.
    fn take_last_expression(&mut self) -> Option<Node> {
        if let Some(container) = self.stack.last_mut() {
            container.node.children_mut().pop()
        } else {
            self.root.take()
        }
    }

    fn previous_is_separator(&self) -> bool {
        matches!(
            self.previous.as_ref().map(|token| &token.kind),
            Some(TokenKind::Separator)
        )
    }

    fn handle_literal(&mut self, token: Token) -> Result<(), ParseError> {
        if !self.value_position_ok() {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        }
        let value = match &token.kind {
            TokenKind::Boolean(b) => Value::Boolean(*b),
            TokenKind::Number(n) => Value::Number(*n),
            TokenKind::Version(v) => Value::Version(*v),
            TokenKind::String(s) => Value::String(s.clone()),
            _ => unreachable!("caller matched a literal kind"),
        };
        self.push_expression(Node::Leaf(value));
        self.previous = Some(token);
        Ok(())
    }

    fn handle_function(&mut self, token: Token) -> Result<(), ParseError> {
        if !self.value_position_ok() {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        }
        let function = match &token.kind {
            TokenKind::Function(builtin) => FunctionDef::Builtin(*builtin),
            TokenKind::Extension(extension) => FunctionDef::Extension(extension.clone()),
            _ => unreachable!("caller matched a function kind"),
        };
        let node = Node::Function {
            function,
            children: Vec::new(),
        };

        match self.lexer.try_next() {
            Some(next) if matches!(next.kind, TokenKind::StartParameter) => {
                self.stack.push(Container { node, token });
                self.previous = Some(next);
                Ok(())
            }
            Some(next) => Err(self.error(ParseErrorKind::ExpectedStartParameter, &next)),
            None => Err(self.error(ParseErrorKind::ExpectedStartParameter, &token)),
        }
    }

    fn handle_start_index(&mut self, token: Token) -> Result<(), ParseError> {
        if !self.indexable_position() {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        }
        let Some(target) = self.take_last_expression() else {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        };
        let node = Node::Indexer {
            children: vec![target],
        };
        self.stack.push(Container {
            node,
            token: token.clone(),
        });
        self.previous = Some(token);
        Ok(())
    }

    /// `a.b` desugars to the same tree as `a['b']`; the indexer closes
    /// immediately after consuming the property name.
    fn handle_dereference(&mut self, token: Token) -> Result<(), ParseError> {
        if !self.indexable_position() {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        }
        let Some(target) = self.take_last_expression() else {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        };

        match self.lexer.try_next() {
            Some(next) => {
                let TokenKind::PropertyName(name) = &next.kind else {
                    return Err(self.error(ParseErrorKind::ExpectedPropertyName, &next));
                };
                let node = Node::Indexer {
                    children: vec![target, Node::Leaf(Value::String(name.clone()))],
                };
                self.push_expression(node);
                self.previous = Some(next);
                Ok(())
            }
            None => Err(self.error(ParseErrorKind::ExpectedPropertyName, &token)),
        }
    }

    fn handle_end_index(&mut self, token: Token) -> Result<(), ParseError> {
        let Some(container) = self.stack.pop() else {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        };
        let Node::Indexer { ref children } = container.node else {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        };
        if children.len() != 2 {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        }
        self.push_expression(container.node);
        self.previous = Some(token);
        Ok(())
    }

    fn handle_end_parameter(&mut self, token: Token) -> Result<(), ParseError> {
        if self.previous_is_separator() {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        }
        let Some(container) = self.stack.pop() else {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        };
        let Node::Function {
            ref function,
            ref children,
        } = container.node
        else {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        };
        if children.len() < function.arity().0 {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        }
        self.push_expression(container.node);
        self.previous = Some(token);
        Ok(())
    }

    fn handle_separator(&mut self, token: Token) -> Result<(), ParseError> {
        let ok = match self.stack.last() {
            Some(Container {
                node: Node::Function { function, children },
                ..
            }) => {
                !children.is_empty()
                    && children.len() < function.arity().1
                    && !self.previous_is_separator()
            }
            _ => false,
        };
        if !ok {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        }
        self.previous = Some(token);
        Ok(())
    }

    fn error(&self, kind: ParseErrorKind, token: &Token) -> ParseError {
        ParseError::new(kind, token, self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::NoopTraceWriter;
    use rust_decimal::Decimal;

    fn parse_plain(raw: &str) -> Result<Expression, ParseError> {
        parse(raw, &mut NoopTraceWriter, &ExtensionRegistry::new())
    }

    fn parse_with_test_data(raw: &str) -> Result<Expression, ParseError> {
        let mut registry = ExtensionRegistry::new();
        registry
            .register(ExtensionFunction::new("testData", 0, 0, |_args, _context| {
                Ok(Value::Null)
            }))
            .unwrap();
        parse(raw, &mut NoopTraceWriter, &registry)
    }

    fn leaf(value: impl Into<Value>) -> Node {
        Node::Leaf(value.into())
    }

    #[test]
    fn test_empty_expression_is_legal() {
        let expression = parse_plain("").unwrap();
        assert_eq!(expression.root(), None);
        let expression = parse_plain("   ").unwrap();
        assert_eq!(expression.root(), None);
    }

    #[test]
    fn test_literal_root() {
        let expression = parse_plain("true").unwrap();
        assert_eq!(expression.root(), Some(&leaf(true)));

        let expression = parse_plain("'abc'").unwrap();
        assert_eq!(expression.root(), Some(&leaf("abc")));
    }

    #[test]
    fn test_nested_function_tree() {
        let expression = parse_plain("and(true, eq(1, 2))").unwrap();
        let expected = Node::Function {
            function: FunctionDef::Builtin(Builtin::And),
            children: vec![
                leaf(true),
                Node::Function {
                    function: FunctionDef::Builtin(Builtin::Eq),
                    children: vec![leaf(1), leaf(2)],
                },
            ],
        };
        assert_eq!(expression.root(), Some(&expected));
    }

    #[test]
    fn test_dereference_desugars_to_indexer() {
        let dotted = parse_with_test_data("testData().prop").unwrap();
        let indexed = parse_with_test_data("testData()['prop']").unwrap();
        assert_eq!(dotted.root(), indexed.root());
    }

    #[test]
    fn test_chained_indexers() {
        let expression = parse_with_test_data("testData().subObj.nested['leaf']").unwrap();
        let Some(Node::Indexer { children }) = expression.root() else {
            panic!("expected indexer root");
        };
        assert_eq!(children[1], leaf("leaf"));
        let Node::Indexer { children } = &children[0] else {
            panic!("expected nested indexer");
        };
        assert_eq!(children[1], leaf("nested"));
    }

    #[test]
    fn test_whitespace_does_not_change_the_tree() {
        let tight = parse_plain("and(true,eq(1,2))").unwrap();
        let airy = parse_plain("  and ( true ,  eq( 1 , 2 ) )  ").unwrap();
        assert_eq!(tight.root(), airy.root());
    }

    #[test]
    fn test_unrecognized_value() {
        let err = parse_plain("eq(1.2, 3.4a)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnrecognizedValue);
        assert_eq!(err.raw_token, "3.4a");
    }

    #[test]
    fn test_expected_start_parameter() {
        let err = parse_plain("not true").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedStartParameter);

        let err = parse_plain("not").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedStartParameter);
        assert_eq!(err.raw_token, "not");
    }

    #[test]
    fn test_expected_property_name() {
        let err = parse_with_test_data("testData().'oops'").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedPropertyName);

        let err = parse_with_test_data("testData().").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedPropertyName);
    }

    #[test]
    fn test_unclosed_function() {
        let err = parse_plain("and(true, false").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnclosedFunction);
        assert_eq!(err.raw_token, "and");
        assert_eq!(err.token_index, 0);
    }

    #[test]
    fn test_unclosed_indexer() {
        let err = parse_with_test_data("testData()['key'").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnclosedIndexer);
        assert_eq!(err.raw_token, "[");
    }

    #[test]
    fn test_unexpected_symbol_cases() {
        for raw in [
            "eq(1, 2) true",   // literal after a closed call
            "(true)",          // bare parenthesis
            "eq(1)",           // too few parameters
            "eq(1, 2, 3)",     // too many parameters
            "and(, true)",     // separator with no child
            "and(true,, false)", // doubled separator
            "and(true, false,)", // trailing separator
            "]",               // closing with nothing open
            "not(true)]",      // closing indexer over a function
            "[1]",             // indexer with no receiver
            "true.name",       // dereference of a literal
        ] {
            let err = parse_plain(raw).unwrap_err();
            assert_eq!(
                err.kind,
                ParseErrorKind::UnexpectedSymbol,
                "input {:?} produced {:?}",
                raw,
                err.kind
            );
        }
    }

    #[test]
    fn test_extension_arity_is_enforced() {
        let mut registry = ExtensionRegistry::new();
        registry
            .register(ExtensionFunction::new("pick", 1, 2, |_args, _context| {
                Ok(Value::Null)
            }))
            .unwrap();

        assert!(parse("pick(1)", &mut NoopTraceWriter, &registry).is_ok());
        assert!(parse("pick(1, 2)", &mut NoopTraceWriter, &registry).is_ok());
        let err = parse("pick()", &mut NoopTraceWriter, &registry).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedSymbol);
        let err = parse("pick(1, 2, 3)", &mut NoopTraceWriter, &registry).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedSymbol);
    }

    #[test]
    fn test_number_and_version_literals() {
        let expression = parse_plain("in(1.5, 1.2.3)").unwrap();
        let Some(Node::Function { children, .. }) = expression.root() else {
            panic!("expected function root");
        };
        assert_eq!(
            children[0],
            Node::Leaf(Value::Number(Decimal::from_str_exact("1.5").unwrap()))
        );
        assert!(matches!(children[1], Node::Leaf(Value::Version(_))));
    }

    #[test]
    fn test_error_display_is_one_based() {
        let err = parse_plain("eq(1.2, 3.4a)").unwrap_err();
        let message = err.to_string();
        assert_eq!(
            message,
            "Unrecognized value: '3.4a'. Located at position 9 within condition expression: eq(1.2, 3.4a)"
        );
    }
}
