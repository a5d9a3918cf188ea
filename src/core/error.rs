//! CK-007: Error taxonomy for recipe evaluation and notification resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving a notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// The target descriptor does not match `type[name]`.
    #[error("'{0}' doesn't represent a resource.")]
    Parse(String),

    /// No resource in the owning recipe matches the descriptor.
    #[error("'{0}' resource is not found.")]
    NotFound(String),

    /// Timing is not one of `delay`, `delayed`, `immediately`.
    #[error("'{0}' is not valid notification timing. (Valid option is delayed or immediately)")]
    InvalidTiming(String),
}

/// Errors raised while evaluating recipes into a resource graph.
#[derive(Debug, Error)]
pub enum RecipeError {
    /// An included (or top-level) recipe file does not exist.
    #[error("Recipe not found. ({target})")]
    NotFound { target: String, path: PathBuf },

    /// A recipe includes itself, directly or through other recipes.
    #[error("recipe inclusion cycle: {}", format_chain(.chain))]
    IncludeCycle { chain: Vec<PathBuf> },

    /// A recipe file exists but could not be read.
    #[error("cannot read recipe {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A recipe file is not a well-formed statement list.
    #[error("recipe parse error in {}: {message}", .path.display())]
    Syntax { path: PathBuf, message: String },

    /// A `{{ }}` placeholder names a variable the scope does not bind.
    #[error("undefined variable '{name}' in \"{template}\"")]
    UndefinedVariable { name: String, template: String },

    /// `define` tried to claim a built-in keyword.
    #[error("'{0}' is a reserved keyword and cannot be used as a definition name")]
    ReservedKeyword(String),

    /// A statement keyword is neither a resource kind nor a known definition.
    #[error("unknown resource type or definition '{0}'")]
    UnknownOperation(String),

    /// A definition invocation set an attribute the definition does not declare.
    #[error("definition '{definition}' has no parameter '{param}'")]
    UnknownParam { definition: String, param: String },

    /// A resource block requested an action its kind does not support.
    #[error("{resource}: action '{action}' is not supported (expected one of: {expected})")]
    UnsupportedAction {
        resource: String,
        action: String,
        expected: String,
    },

    #[error(transparent)]
    Notification(#[from] NotificationError),
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
