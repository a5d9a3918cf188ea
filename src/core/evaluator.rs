//! CK-009: Evaluation state for one run: recipe graph, definitions, and loader.
//!
//! Loads top-level recipes into a [`RecipeGraph`]. Every context created
//! during the run borrows the same `Evaluation`, so definitions registered
//! anywhere are visible to every recipe evaluated afterwards.

use super::context::RecipeContext;
use super::definition::DefinitionTable;
use super::error::RecipeError;
use super::loader::{self, LocalFs, RecipeLoader};
use super::parser::{self, Statement};
use super::scope::Scope;
use super::types::{Recipe, RecipeGraph, RecipeId};
use std::path::{Path, PathBuf};

/// State shared by every evaluation context of one run.
pub struct Evaluation {
    graph: RecipeGraph,
    definitions: DefinitionTable,
    loader: Box<dyn RecipeLoader>,
    /// Recipe files currently being evaluated, outermost first.
    stack: Vec<PathBuf>,
}

impl Default for Evaluation {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluation {
    /// Evaluation reading recipes from the local filesystem.
    pub fn new() -> Self {
        Self::with_loader(LocalFs)
    }

    pub fn with_loader(loader: impl RecipeLoader + 'static) -> Self {
        Self {
            graph: RecipeGraph::new(),
            definitions: DefinitionTable::new(),
            loader: Box::new(loader),
            stack: Vec::new(),
        }
    }

    /// Load and evaluate a top-level recipe file.
    ///
    /// Relative paths are taken from the current directory.
    pub fn load(&mut self, path: &Path, scope: &Scope) -> Result<RecipeId, RecipeError> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let abs = loader::normalize(&cwd.join(path));
        if !self.loader.exists(&abs) || self.loader.is_dir(&abs) {
            return Err(RecipeError::NotFound {
                target: path.display().to_string(),
                path: abs,
            });
        }

        let statements = self.read_recipe(&abs)?;
        let id = self.graph.add_root(Recipe::from_file(abs.clone()));
        tracing::debug!("Evaluating recipe {}", abs.display());

        self.enter(&abs)?;
        let result = RecipeContext::new(self, id, scope.clone()).evaluate(&statements);
        self.leave();
        result.map(|()| id)
    }

    /// Start a top-level recipe without a file, for the builder API.
    ///
    /// `path` only anchors relative `include_recipe` targets and the recipe
    /// directory handed to templates.
    pub fn root(&mut self, path: impl Into<PathBuf>, scope: Scope) -> RecipeContext<'_> {
        let id = self.graph.add_root(Recipe::from_file(path));
        RecipeContext::new(self, id, scope)
    }

    pub fn graph(&self) -> &RecipeGraph {
        &self.graph
    }

    pub fn into_graph(self) -> RecipeGraph {
        self.graph
    }

    pub fn definitions(&self) -> &DefinitionTable {
        &self.definitions
    }

    pub(crate) fn graph_mut(&mut self) -> &mut RecipeGraph {
        &mut self.graph
    }

    pub(crate) fn definitions_mut(&mut self) -> &mut DefinitionTable {
        &mut self.definitions
    }

    pub(crate) fn loader(&self) -> &dyn RecipeLoader {
        self.loader.as_ref()
    }

    pub(crate) fn read_recipe(&self, path: &Path) -> Result<Vec<Statement>, RecipeError> {
        let source = self
            .loader
            .read_to_string(path)
            .map_err(|source| RecipeError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        parser::parse_recipe(&source, path)
    }

    /// Push `path` onto the inclusion stack, refusing cycles.
    pub(crate) fn enter(&mut self, path: &Path) -> Result<(), RecipeError> {
        if self.stack.iter().any(|p| p == path) {
            let mut chain = self.stack.clone();
            chain.push(path.to_path_buf());
            return Err(RecipeError::IncludeCycle { chain });
        }
        self.stack.push(path.to_path_buf());
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.stack.pop();
    }
}
