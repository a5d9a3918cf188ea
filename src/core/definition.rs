//! CK-006: Definitions, named, parameterized resource macros.
//!
//! `define` registers a definition in the run-wide [`DefinitionTable`]. An
//! invocation merges the declared parameter defaults with the invocation
//! block, adds the reserved `name` attribute, and evaluates the body in a
//! fresh sub-recipe whose scope binds `params`.

use super::context::RecipeContext;
use super::error::RecipeError;
use super::parser::Statement;
use super::scope::Scope;
use super::types::Block;
use indexmap::IndexMap;
use serde_yaml_ng::{Mapping, Value};
use std::fmt;
use std::rc::Rc;

/// Native definition body for Rust hosts.
pub type NativeBody = Rc<dyn Fn(&mut RecipeContext<'_>) -> Result<(), RecipeError>>;

/// What a definition expands into.
#[derive(Clone)]
pub enum DefinitionBody {
    /// Statements parsed from a recipe file.
    Statements(Vec<Statement>),
    /// A closure driving the builder API.
    Native(NativeBody),
}

impl DefinitionBody {
    pub fn native(f: impl Fn(&mut RecipeContext<'_>) -> Result<(), RecipeError> + 'static) -> Self {
        Self::Native(Rc::new(f))
    }

    pub(crate) fn evaluate(&self, ctx: &mut RecipeContext<'_>) -> Result<(), RecipeError> {
        match self {
            Self::Statements(statements) => ctx.evaluate(statements),
            Self::Native(f) => f(ctx),
        }
    }
}

impl fmt::Debug for DefinitionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Statements(s) => f.debug_tuple("Statements").field(&s.len()).finish(),
            Self::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// A registered definition.
#[derive(Debug, Clone)]
pub struct Definition {
    name: String,
    params: IndexMap<String, Value>,
    body: DefinitionBody,
}

impl Definition {
    pub fn new(name: impl Into<String>, params: IndexMap<String, Value>, body: DefinitionBody) -> Self {
        Self {
            name: name.into(),
            params,
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &IndexMap<String, Value> {
        &self.params
    }

    pub fn body(&self) -> &DefinitionBody {
        &self.body
    }

    /// Attribute mapping for one invocation: defaults, overridden by the
    /// block, plus `name` holding the invocation argument.
    pub fn attributes(
        &self,
        invocation: &str,
        block: Option<&Block>,
        scope: &Scope,
    ) -> Result<Mapping, RecipeError> {
        let mut attrs = Mapping::new();
        for (key, default) in &self.params {
            attrs.insert(Value::String(key.clone()), default.clone());
        }
        if let Some(block) = block {
            for (key, value) in &block.attributes {
                if !self.params.contains_key(key) {
                    return Err(RecipeError::UnknownParam {
                        definition: self.name.clone(),
                        param: key.clone(),
                    });
                }
                attrs.insert(Value::String(key.clone()), scope.resolve_value(value)?);
            }
        }
        attrs.insert(
            Value::String("name".to_string()),
            Value::String(invocation.to_string()),
        );
        Ok(attrs)
    }
}

/// Definitions visible to every context of one evaluation.
#[derive(Debug, Clone, Default)]
pub struct DefinitionTable {
    entries: IndexMap<String, Rc<Definition>>,
}

impl DefinitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition`, replacing any earlier one with the same name.
    pub fn register(&mut self, definition: Definition) {
        let name = definition.name.clone();
        if self.entries.insert(name.clone(), Rc::new(definition)).is_some() {
            tracing::debug!("Definition, {}, is redefined", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Rc<Definition>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
