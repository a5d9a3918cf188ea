//! Cocina: recipe evaluation for server provisioning.
//!
//! Evaluates YAML recipes into a tree of declared resources, expanding
//! definitions and included recipes, and resolves the notifications
//! resources send each other.

pub mod cli;
pub mod core;
pub mod resources;
