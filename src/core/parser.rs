//! CK-002: Recipe file parsing.
//!
//! A recipe file is a YAML sequence of statements. Each statement is a
//! mapping with one keyword key:
//! - `include_recipe: <target>`
//! - `define: <name>` with optional `params` and a `body` statement list
//! - any other keyword (resource kind or definition) with the identifier as
//!   its value, plus optional `with` (attributes) and `notifies` siblings

use super::error::RecipeError;
use super::scope::value_to_string;
use super::types::{Block, NotifyDecl};
use indexmap::IndexMap;
use serde_yaml_ng::{Mapping, Value};
use std::path::{Path, PathBuf};

/// One recipe statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Declare a resource or invoke a definition.
    Declare {
        keyword: String,
        identifier: String,
        block: Option<Block>,
    },
    /// Register a definition.
    Define {
        name: String,
        params: IndexMap<String, Value>,
        body: Vec<Statement>,
    },
    /// Include another recipe file.
    IncludeRecipe { target: String },
}

const DEFAULT_TIMING: &str = "delay";

/// Parse recipe source. `path` is used for error messages only.
pub fn parse_recipe(source: &str, path: &Path) -> Result<Vec<Statement>, RecipeError> {
    let p = StatementParser { path };
    let doc: Value = serde_yaml_ng::from_str(source).map_err(|e| p.error(e.to_string()))?;
    match doc {
        // An empty file is an empty recipe.
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => p.statements(&items, "recipe"),
        _ => Err(p.error("a recipe must be a list of statements")),
    }
}

struct StatementParser<'a> {
    path: &'a Path,
}

impl StatementParser<'_> {
    fn error(&self, message: impl Into<String>) -> RecipeError {
        RecipeError::Syntax {
            path: PathBuf::from(self.path),
            message: message.into(),
        }
    }

    fn statements(&self, items: &[Value], context: &str) -> Result<Vec<Statement>, RecipeError> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.statement(item, &format!("{} statement #{}", context, i + 1)))
            .collect()
    }

    fn statement(&self, item: &Value, at: &str) -> Result<Statement, RecipeError> {
        let map = item
            .as_mapping()
            .ok_or_else(|| self.error(format!("{}: expected a mapping", at)))?;

        if let Some(target) = map.get("include_recipe") {
            self.only_keys(map, &["include_recipe"], at)?;
            return Ok(Statement::IncludeRecipe {
                target: self.scalar(target, at, "include_recipe")?,
            });
        }

        if let Some(name) = map.get("define") {
            self.only_keys(map, &["define", "params", "body"], at)?;
            let name = self.scalar(name, at, "define")?;
            let params = match map.get("params") {
                None | Some(Value::Null) => IndexMap::new(),
                Some(Value::Mapping(m)) => self.string_keyed(m, at, "params")?,
                Some(_) => return Err(self.error(format!("{}: params must be a mapping", at))),
            };
            let body = match map.get("body") {
                Some(Value::Sequence(items)) => {
                    self.statements(items, &format!("definition '{}'", name))?
                }
                Some(Value::Null) => Vec::new(),
                Some(_) => return Err(self.error(format!("{}: body must be a list", at))),
                None => return Err(self.error(format!("{}: define '{}' has no body", at, name))),
            };
            return Ok(Statement::Define { name, params, body });
        }

        let keywords: Vec<&str> = map
            .keys()
            .filter_map(Value::as_str)
            .filter(|k| !matches!(*k, "with" | "notifies"))
            .collect();
        let keyword = match keywords.as_slice() {
            [k] => *k,
            [] => return Err(self.error(format!("{}: missing resource keyword", at))),
            many => {
                return Err(self.error(format!(
                    "{}: expected one keyword, found {}",
                    at,
                    many.join(", ")
                )))
            }
        };
        if map.keys().any(|k| k.as_str().is_none()) {
            return Err(self.error(format!("{}: keys must be strings", at)));
        }

        let identifier = map
            .get(keyword)
            .ok_or_else(|| self.error(format!("{}: missing value for '{}'", at, keyword)))
            .and_then(|v| self.scalar(v, at, keyword))?;
        let block = self.block(map, at)?;

        Ok(Statement::Declare {
            keyword: keyword.to_string(),
            identifier,
            block,
        })
    }

    fn block(&self, map: &Mapping, at: &str) -> Result<Option<Block>, RecipeError> {
        let attributes = match map.get("with") {
            None | Some(Value::Null) => IndexMap::new(),
            Some(Value::Mapping(m)) => self.string_keyed(m, at, "with")?,
            Some(_) => return Err(self.error(format!("{}: with must be a mapping", at))),
        };
        let notifies = match map.get("notifies") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|n| self.notify(n, at))
                .collect::<Result<Vec<_>, _>>()?,
            Some(single @ Value::Mapping(_)) => vec![self.notify(single, at)?],
            Some(_) => return Err(self.error(format!("{}: notifies must be a list", at))),
        };
        if attributes.is_empty() && notifies.is_empty() && !map.contains_key("with") {
            return Ok(None);
        }
        Ok(Some(Block {
            attributes,
            notifies,
        }))
    }

    fn notify(&self, entry: &Value, at: &str) -> Result<NotifyDecl, RecipeError> {
        match entry {
            Value::Sequence(parts) if (2..=3).contains(&parts.len()) => Ok(NotifyDecl {
                action: self.scalar(&parts[0], at, "notifies action")?,
                target: self.scalar(&parts[1], at, "notifies resource")?,
                timing: match parts.get(2) {
                    Some(t) => self.scalar(t, at, "notifies timing")?,
                    None => DEFAULT_TIMING.to_string(),
                },
            }),
            Value::Mapping(m) => {
                let field = |key: &str| -> Result<Option<String>, RecipeError> {
                    m.get(key)
                        .map(|v| self.scalar(v, at, &format!("notifies {}", key)))
                        .transpose()
                };
                Ok(NotifyDecl {
                    action: field("action")?
                        .ok_or_else(|| self.error(format!("{}: notifies entry has no action", at)))?,
                    target: field("resource")?.ok_or_else(|| {
                        self.error(format!("{}: notifies entry has no resource", at))
                    })?,
                    timing: field("timing")?.unwrap_or_else(|| DEFAULT_TIMING.to_string()),
                })
            }
            _ => Err(self.error(format!(
                "{}: notifies entries are [action, resource, timing?] or a mapping",
                at
            ))),
        }
    }

    fn scalar(&self, value: &Value, at: &str, what: &str) -> Result<String, RecipeError> {
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(value_to_string(value)),
            _ => Err(self.error(format!("{}: {} must be a scalar", at, what))),
        }
    }

    fn string_keyed(
        &self,
        map: &Mapping,
        at: &str,
        what: &str,
    ) -> Result<IndexMap<String, Value>, RecipeError> {
        map.iter()
            .map(|(k, v)| match k.as_str() {
                Some(key) => Ok((key.to_string(), v.clone())),
                None => Err(self.error(format!("{}: {} keys must be strings", at, what))),
            })
            .collect()
    }

    fn only_keys(&self, map: &Mapping, allowed: &[&str], at: &str) -> Result<(), RecipeError> {
        for key in map.keys() {
            let key = key.as_str().unwrap_or("<non-string>");
            if !allowed.contains(&key) {
                return Err(self.error(format!("{}: unexpected key '{}'", at, key)));
            }
        }
        Ok(())
    }
}
