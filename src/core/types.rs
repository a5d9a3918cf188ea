//! CK-001: Core types: resource kinds, resources, blocks, and the recipe graph.
//!
//! Recipes live in an arena ([`RecipeGraph`]) and are addressed by
//! [`RecipeId`]. Each recipe owns an ordered child list; the order is the
//! apply order. Notifications reference their owning recipe by id.

use super::error::RecipeError;
use super::notification::{Notification, Timing};
use super::scope::{value_to_string, Scope};
use crate::resources;
use indexmap::IndexMap;
use serde::Serialize;
use serde_yaml_ng::Value;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Resource kinds
// ============================================================================

/// Built-in resource kinds. Each one is also a DSL keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Directory,
    Execute,
    File,
    GemPackage,
    Git,
    Link,
    Package,
    RemoteFile,
    Service,
    Template,
}

impl ResourceType {
    pub const ALL: [ResourceType; 10] = [
        Self::Directory,
        Self::Execute,
        Self::File,
        Self::GemPackage,
        Self::Git,
        Self::Link,
        Self::Package,
        Self::RemoteFile,
        Self::Service,
        Self::Template,
    ];

    /// The DSL keyword (and descriptor type) for this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Execute => "execute",
            Self::File => "file",
            Self::GemPackage => "gem_package",
            Self::Git => "git",
            Self::Link => "link",
            Self::Package => "package",
            Self::RemoteFile => "remote_file",
            Self::Service => "service",
            Self::Template => "template",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == keyword)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// A notification as written in a block, before timing is validated.
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyDecl {
    pub action: String,
    pub target: String,
    pub timing: String,
}

/// Configuration block of a declaration: attributes plus notifications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub attributes: IndexMap<String, Value>,
    pub notifies: Vec<NotifyDecl>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Notify `target` with `action` at the end of the run.
    pub fn notifies(self, action: impl Into<String>, target: impl Into<String>) -> Self {
        self.notifies_with(action, target, Timing::Delay.as_str())
    }

    /// Notify `target` with `action` using an explicit timing token.
    pub fn notifies_with(
        mut self,
        action: impl Into<String>,
        target: impl Into<String>,
        timing: impl Into<String>,
    ) -> Self {
        self.notifies.push(NotifyDecl {
            action: action.into(),
            target: target.into(),
            timing: timing.into(),
        });
        self
    }
}

// ============================================================================
// Resources
// ============================================================================

/// A declared unit of desired state.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    resource_type: ResourceType,
    #[serde(rename = "name")]
    resource_name: String,
    #[serde(skip)]
    recipe: RecipeId,
    attributes: IndexMap<String, Value>,
    notifications: Vec<Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<Value>,
}

impl Resource {
    /// Build a resource of `kind` bound to `recipe`.
    ///
    /// Block attributes have their placeholders resolved against `scope`; the
    /// identifier is stored under the kind's identity attribute unless the
    /// block sets it. Notification timings are validated here.
    pub fn new(
        kind: ResourceType,
        identifier: &str,
        recipe: RecipeId,
        scope: &Scope,
        block: Option<Block>,
    ) -> Result<Self, RecipeError> {
        let block = block.unwrap_or_default();
        let spec = resources::spec(kind);

        let mut attributes = IndexMap::new();
        attributes.insert(
            spec.identity.to_string(),
            Value::String(identifier.to_string()),
        );
        for (key, value) in &block.attributes {
            attributes.insert(key.clone(), scope.resolve_value(value)?);
        }

        let resource_name = identifier.to_string();
        if let Some(action) = attributes.get("action") {
            check_actions(kind, &resource_name, action, spec.actions)?;
        }

        let mut notifications = Vec::with_capacity(block.notifies.len());
        for decl in &block.notifies {
            let target = scope.resolve_template(&decl.target)?;
            notifications.push(Notification::create(
                recipe,
                decl.action.clone(),
                target,
                &decl.timing,
            ));
        }

        Ok(Self {
            resource_type: kind,
            resource_name,
            recipe,
            attributes,
            notifications,
            recipe_dir: None,
            node: None,
        })
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn recipe(&self) -> RecipeId {
        self.recipe
    }

    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Actions to run, falling back to the kind's default.
    pub fn actions(&self) -> Vec<String> {
        match self.attributes.get("action") {
            Some(Value::Sequence(items)) => items.iter().map(value_to_string).collect(),
            Some(v) => vec![value_to_string(v)],
            None => vec![resources::spec(self.resource_type)
                .default_action
                .to_string()],
        }
    }

    /// Descriptor form, e.g. `service[nginx]`.
    pub fn descriptor(&self) -> String {
        format!("{}[{}]", self.resource_type, self.resource_name)
    }
}

fn check_actions(
    kind: ResourceType,
    name: &str,
    action: &Value,
    accepted: &[&str],
) -> Result<(), RecipeError> {
    let requested: Vec<String> = match action {
        Value::Sequence(items) => items.iter().map(value_to_string).collect(),
        other => vec![value_to_string(other)],
    };
    for a in requested {
        if !accepted.contains(&a.as_str()) {
            return Err(RecipeError::UnsupportedAction {
                resource: format!("{}[{}]", kind, name),
                action: a,
                expected: accepted.join(", "),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Recipes
// ============================================================================

/// Index of a recipe in its [`RecipeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecipeId(usize);

/// Where a recipe node came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecipeKind {
    /// Loaded from a recipe file (top-level or `include_recipe`).
    File,
    /// Synthesised by invoking a definition.
    Definition { definition: String, name: String },
}

/// An entry in a recipe's ordered child list.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Child {
    Resource(Resource),
    Recipe(RecipeId),
}

/// An ordered container of declared resources and nested recipes.
#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    path: PathBuf,
    #[serde(flatten)]
    kind: RecipeKind,
    children: Vec<Child>,
}

impl Recipe {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: RecipeKind::File,
            children: Vec::new(),
        }
    }

    /// A definition expansion; `path` is the recipe file it was invoked from.
    pub fn from_definition(
        definition: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            path: path.into(),
            kind: RecipeKind::Definition {
                definition: definition.into(),
                name: name.into(),
            },
            children: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the recipe source.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }

    pub fn kind(&self) -> &RecipeKind {
        &self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == RecipeKind::File
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    /// Direct resource children in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.children.iter().filter_map(|c| match c {
            Child::Resource(r) => Some(r),
            Child::Recipe(_) => None,
        })
    }
}

/// Arena of every recipe produced by one evaluation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecipeGraph {
    roots: Vec<RecipeId>,
    recipes: Vec<Recipe>,
}

impl RecipeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipe with no parent.
    pub fn add_root(&mut self, recipe: Recipe) -> RecipeId {
        let id = self.insert(recipe);
        self.roots.push(id);
        id
    }

    /// Add `recipe` and append it to `parent`'s children.
    pub fn add_child_recipe(&mut self, parent: RecipeId, recipe: Recipe) -> RecipeId {
        let id = self.insert(recipe);
        self.recipes[parent.0].children.push(Child::Recipe(id));
        id
    }

    /// Append a resource to `parent`'s children.
    pub fn push_resource(&mut self, parent: RecipeId, resource: Resource) {
        self.recipes[parent.0].children.push(Child::Resource(resource));
    }

    fn insert(&mut self, recipe: Recipe) -> RecipeId {
        self.recipes.push(recipe);
        RecipeId(self.recipes.len() - 1)
    }

    pub fn roots(&self) -> &[RecipeId] {
        &self.roots
    }

    pub fn recipe(&self, id: RecipeId) -> &Recipe {
        &self.recipes[id.0]
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Every resource in apply order (depth-first over the children lists).
    pub fn resources(&self) -> Vec<&Resource> {
        let mut out = Vec::new();
        for &root in &self.roots {
            self.collect_resources(root, &mut out);
        }
        out
    }

    fn collect_resources<'a>(&'a self, id: RecipeId, out: &mut Vec<&'a Resource>) {
        for child in &self.recipes[id.0].children {
            match child {
                Child::Resource(r) => out.push(r),
                Child::Recipe(nested) => self.collect_resources(*nested, out),
            }
        }
    }

    /// Resolve every pending notification in apply order.
    ///
    /// Returns `(notifying resource, notification, target)` triples, or the
    /// first resolution failure.
    #[allow(clippy::type_complexity)]
    pub fn resolve_notifications(
        &self,
    ) -> Result<Vec<(&Resource, &Notification, &Resource)>, RecipeError> {
        let mut resolved = Vec::new();
        for resource in self.resources() {
            for notification in resource.notifications() {
                let target = notification.resource(self)?;
                resolved.push((resource, notification, target));
            }
        }
        Ok(resolved)
    }
}

// ============================================================================
// Tests
// ============================================================================
