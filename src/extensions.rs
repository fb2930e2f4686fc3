// Extension Functions
// Registration contract for caller-supplied functions such as succeeded()

use crate::evaluator::EvaluationContext;
use crate::value::{ConvertError, Value};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Body of an extension function.
///
/// Arguments arrive already evaluated; the opaque embedder state is read
/// through the context.
pub type ExtensionBody =
    Arc<dyn Fn(&[Value], &mut EvaluationContext<'_>) -> Result<Value, ConvertError> + Send + Sync>;

/// A caller-registered function recognized by the lexer and invoked during
/// evaluation.
#[derive(Clone)]
pub struct ExtensionFunction {
    pub name: String,
    pub min_parameters: usize,
    pub max_parameters: usize,
    pub body: ExtensionBody,
}

impl ExtensionFunction {
    pub fn new<F>(
        name: impl Into<String>,
        min_parameters: usize,
        max_parameters: usize,
        body: F,
    ) -> Self
    where
        F: Fn(&[Value], &mut EvaluationContext<'_>) -> Result<Value, ConvertError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            min_parameters,
            max_parameters,
            body: Arc::new(body),
        }
    }
}

impl fmt::Debug for ExtensionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionFunction")
            .field("name", &self.name)
            .field("min_parameters", &self.min_parameters)
            .field("max_parameters", &self.max_parameters)
            .finish_non_exhaustive()
    }
}

/// Errors raised while registering extensions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("extension function '{0}' is already registered")]
    DuplicateName(String),
}

/// Case-insensitive registry of extension functions, consulted by the lexer
/// for keyword classification and by the parser for arities.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    functions: HashMap<String, Arc<ExtensionFunction>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: ExtensionFunction) -> Result<(), RegistryError> {
        let key = function.name.to_ascii_lowercase();
        if self.functions.contains_key(&key) {
            return Err(RegistryError::DuplicateName(function.name));
        }
        self.functions.insert(key, Arc::new(function));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<ExtensionFunction>> {
        self.functions.get(&name.to_ascii_lowercase())
    }
}
