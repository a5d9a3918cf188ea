//! Core recipe evaluation: types, parsing, scopes, definitions, notifications.

pub mod context;
pub mod definition;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod notification;
pub mod parser;
pub mod scope;
pub mod types;

pub use context::RecipeContext;
pub use error::{NotificationError, RecipeError};
pub use evaluator::Evaluation;
pub use scope::Scope;
