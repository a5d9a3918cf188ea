//! CK-004: Recipe evaluation context (the resource graph builder).
//!
//! A context evaluates one recipe body against one scope and appends what it
//! declares to that recipe's children. Keywords are dispatched through an
//! operation table: built-in resource kinds first, then the run-wide
//! definition table. Nested recipes (inclusions, definition expansions) get
//! their own context on a freshly created child recipe.

use super::definition::{Definition, DefinitionBody};
use super::error::RecipeError;
use super::evaluator::Evaluation;
use super::loader;
use super::parser::Statement;
use super::scope::Scope;
use super::types::{Block, Child, Recipe, RecipeId, Resource, ResourceType};
use crate::resources;
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::path::PathBuf;
use std::rc::Rc;

/// Keywords that are recipe syntax rather than resource kinds.
const SYNTAX_KEYWORDS: &[&str] = &["define", "include_recipe", "with", "notifies"];

/// What a keyword resolves to.
#[derive(Debug, Clone)]
pub enum Operation {
    Resource(ResourceType),
    Definition(Rc<Definition>),
}

/// Whether `name` is taken by the recipe language itself.
pub fn is_reserved(name: &str) -> bool {
    ResourceType::from_keyword(name).is_some() || SYNTAX_KEYWORDS.contains(&name)
}

/// Evaluation context for one recipe.
pub struct RecipeContext<'a> {
    eval: &'a mut Evaluation,
    recipe: RecipeId,
    scope: Scope,
}

impl<'a> RecipeContext<'a> {
    pub fn new(eval: &'a mut Evaluation, recipe: RecipeId, scope: Scope) -> Self {
        Self {
            eval,
            recipe,
            scope,
        }
    }

    /// The recipe this context appends to.
    pub fn recipe_id(&self) -> RecipeId {
        self.recipe
    }

    /// Read a scope entry. Lazy entries are computed on every call.
    pub fn var(&self, name: &str) -> Option<Value> {
        self.scope.get(name)
    }

    /// Read a scope entry, passing `arg` to a lazy entry.
    pub fn call(&self, name: &str, arg: &Value) -> Option<Value> {
        self.scope.call(name, arg)
    }

    pub fn directory(&mut self, path: &str, block: Option<Block>) -> Result<(), RecipeError> {
        self.add(ResourceType::Directory, path, block)
    }

    pub fn execute(&mut self, command: &str, block: Option<Block>) -> Result<(), RecipeError> {
        self.add(ResourceType::Execute, command, block)
    }

    pub fn file(&mut self, path: &str, block: Option<Block>) -> Result<(), RecipeError> {
        self.add(ResourceType::File, path, block)
    }

    pub fn gem_package(&mut self, name: &str, block: Option<Block>) -> Result<(), RecipeError> {
        self.add(ResourceType::GemPackage, name, block)
    }

    pub fn git(&mut self, destination: &str, block: Option<Block>) -> Result<(), RecipeError> {
        self.add(ResourceType::Git, destination, block)
    }

    pub fn link(&mut self, link_path: &str, block: Option<Block>) -> Result<(), RecipeError> {
        self.add(ResourceType::Link, link_path, block)
    }

    pub fn package(&mut self, name: &str, block: Option<Block>) -> Result<(), RecipeError> {
        self.add(ResourceType::Package, name, block)
    }

    pub fn remote_file(&mut self, path: &str, block: Option<Block>) -> Result<(), RecipeError> {
        self.add(ResourceType::RemoteFile, path, block)
    }

    pub fn service(&mut self, name: &str, block: Option<Block>) -> Result<(), RecipeError> {
        self.add(ResourceType::Service, name, block)
    }

    pub fn template(&mut self, path: &str, block: Option<Block>) -> Result<(), RecipeError> {
        self.add(ResourceType::Template, path, block)
    }

    /// Look up what `keyword` does in this evaluation.
    pub fn operation(&self, keyword: &str) -> Option<Operation> {
        ResourceType::from_keyword(keyword)
            .map(Operation::Resource)
            .or_else(|| self.eval.definitions().get(keyword).map(Operation::Definition))
    }

    /// Dispatch a declaration by keyword.
    pub fn declare(
        &mut self,
        keyword: &str,
        identifier: &str,
        block: Option<Block>,
    ) -> Result<(), RecipeError> {
        match self.operation(keyword) {
            Some(Operation::Resource(kind)) => self.add(kind, identifier, block),
            Some(Operation::Definition(definition)) => self.invoke(definition, identifier, block),
            None => Err(RecipeError::UnknownOperation(keyword.to_string())),
        }
    }

    /// Register a definition for every context of this evaluation.
    pub fn define(
        &mut self,
        name: &str,
        params: IndexMap<String, Value>,
        body: DefinitionBody,
    ) -> Result<(), RecipeError> {
        if is_reserved(name) {
            return Err(RecipeError::ReservedKeyword(name.to_string()));
        }
        self.eval
            .definitions_mut()
            .register(Definition::new(name, params, body));
        Ok(())
    }

    /// Include the recipe at `target`, relative to this recipe's directory.
    ///
    /// Including the same file twice from one recipe is a no-op.
    pub fn include_recipe(&mut self, target: &str) -> Result<(), RecipeError> {
        let base = self.current().dir().to_path_buf();
        let path = loader::resolve_recipe_path(self.eval.loader(), target, &base);

        if !self.eval.loader().exists(&path) {
            return Err(RecipeError::NotFound {
                target: target.to_string(),
                path,
            });
        }

        if self.already_included(&path) {
            tracing::debug!(
                "Recipe, {}, is skipped because it is already included",
                path.display()
            );
            return Ok(());
        }

        self.eval.enter(&path)?;
        let result = self.include_file(path.clone());
        self.eval.leave();
        result
    }

    fn include_file(&mut self, path: PathBuf) -> Result<(), RecipeError> {
        let statements = self.eval.read_recipe(&path)?;
        let child = self
            .eval
            .graph_mut()
            .add_child_recipe(self.recipe, Recipe::from_file(path));
        RecipeContext::new(&mut *self.eval, child, self.scope.clone()).evaluate(&statements)
    }

    fn already_included(&self, path: &std::path::Path) -> bool {
        let graph = self.eval.graph();
        self.current().children().iter().any(|child| match child {
            Child::Recipe(id) => {
                let recipe = graph.recipe(*id);
                recipe.is_file() && recipe.path() == path
            }
            Child::Resource(_) => false,
        })
    }

    /// Evaluate parsed recipe statements in order.
    pub fn evaluate(&mut self, statements: &[Statement]) -> Result<(), RecipeError> {
        for statement in statements {
            match statement {
                Statement::Declare {
                    keyword,
                    identifier,
                    block,
                } => {
                    let identifier = self.scope.resolve_template(identifier)?;
                    self.declare(keyword, &identifier, block.clone())?;
                }
                Statement::Define { name, params, body } => {
                    self.define(
                        name,
                        params.clone(),
                        DefinitionBody::Statements(body.clone()),
                    )?;
                }
                Statement::IncludeRecipe { target } => {
                    let target = self.scope.resolve_template(target)?;
                    self.include_recipe(&target)?;
                }
            }
        }
        Ok(())
    }

    fn current(&self) -> &Recipe {
        self.eval.graph().recipe(self.recipe)
    }

    fn add(
        &mut self,
        kind: ResourceType,
        identifier: &str,
        block: Option<Block>,
    ) -> Result<(), RecipeError> {
        let mut resource = Resource::new(kind, identifier, self.recipe, &self.scope, block)?;
        if resources::wants_recipe_dir(kind) {
            resource.recipe_dir = Some(self.current().dir().to_path_buf());
        }
        if resources::wants_node(kind) {
            resource.node = self.scope.get("node");
        }
        self.eval.graph_mut().push_resource(self.recipe, resource);
        Ok(())
    }

    fn invoke(
        &mut self,
        definition: Rc<Definition>,
        invocation: &str,
        block: Option<Block>,
    ) -> Result<(), RecipeError> {
        if block.as_ref().is_some_and(|b| !b.notifies.is_empty()) {
            tracing::warn!(
                "{}[{}]: notifies on a definition invocation are ignored",
                definition.name(),
                invocation
            );
        }
        let params = definition.attributes(invocation, block.as_ref(), &self.scope)?;
        let path = self.current().path().to_path_buf();
        let child = self.eval.graph_mut().add_child_recipe(
            self.recipe,
            Recipe::from_definition(definition.name(), invocation, path),
        );
        let scope = self.scope.extend("params", Value::Mapping(params));
        let mut ctx = RecipeContext::new(&mut *self.eval, child, scope);
        definition.body().evaluate(&mut ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RecipeKind;

    fn eval() -> Evaluation {
        Evaluation::new()
    }

    fn names(eval: &Evaluation, id: RecipeId) -> Vec<String> {
        eval.graph()
            .recipe(id)
            .resources()
            .map(|r| r.descriptor())
            .collect()
    }

    #[test]
    fn test_ck004_declarations_append_in_order() {
        let mut eval = eval();
        let mut ctx = eval.root("/srv/recipes/default.yml", Scope::new());
        let root = ctx.recipe_id();
        ctx.package("nginx", None).unwrap();
        ctx.directory("/var/www", None).unwrap();
        ctx.execute("nginx -t", None).unwrap();
        ctx.file("/etc/nginx/nginx.conf", None).unwrap();
        ctx.gem_package("bundler", None).unwrap();
        ctx.git("/opt/app", None).unwrap();
        ctx.link("/usr/bin/app", None).unwrap();
        ctx.remote_file("/etc/app.conf", None).unwrap();
        ctx.service("nginx", None).unwrap();
        ctx.template("/etc/app.env", None).unwrap();
        assert_eq!(
            names(&eval, root),
            vec![
                "package[nginx]",
                "directory[/var/www]",
                "execute[nginx -t]",
                "file[/etc/nginx/nginx.conf]",
                "gem_package[bundler]",
                "git[/opt/app]",
                "link[/usr/bin/app]",
                "remote_file[/etc/app.conf]",
                "service[nginx]",
                "template[/etc/app.env]",
            ]
        );
    }

    #[test]
    fn test_ck004_side_channel_attributes() {
        let mut eval = eval();
        let node: Value = serde_yaml_ng::from_str("hostname: web-1").unwrap();
        let mut ctx = eval.root(
            "/srv/recipes/web/default.yml",
            Scope::new().with("node", node.clone()),
        );
        let root = ctx.recipe_id();
        ctx.remote_file("/etc/a", None).unwrap();
        ctx.template("/etc/b", None).unwrap();
        ctx.file("/etc/c", None).unwrap();
        let resources: Vec<_> = eval.graph().recipe(root).resources().collect();
        assert_eq!(
            resources[0].recipe_dir.as_deref(),
            Some(std::path::Path::new("/srv/recipes/web"))
        );
        assert_eq!(resources[0].node, None);
        assert_eq!(
            resources[1].recipe_dir.as_deref(),
            Some(std::path::Path::new("/srv/recipes/web"))
        );
        assert_eq!(resources[1].node, Some(node));
        assert_eq!(resources[2].recipe_dir, None);
    }

    #[test]
    fn test_ck004_template_without_node() {
        let mut eval = eval();
        let mut ctx = eval.root("/srv/recipes/default.yml", Scope::new());
        let root = ctx.recipe_id();
        ctx.template("/etc/b", None).unwrap();
        let r = eval.graph().recipe(root).resources().next().unwrap();
        assert_eq!(r.node, None);
    }

    #[test]
    fn test_ck004_accessors() {
        let mut eval = eval();
        let scope = Scope::new()
            .with("role", Value::String("web".into()))
            .with(
                "double",
                crate::core::scope::Binding::lazy(|arg| match arg.and_then(Value::as_u64) {
                    Some(n) => Value::Number((n * 2).into()),
                    None => Value::Null,
                }),
            );
        let ctx = eval.root("/srv/recipes/default.yml", scope);
        assert_eq!(ctx.var("role"), Some(Value::String("web".into())));
        assert_eq!(
            ctx.call("double", &Value::Number(21.into())),
            Some(Value::Number(42.into()))
        );
        assert_eq!(ctx.var("missing"), None);
    }

    #[test]
    fn test_ck004_unknown_keyword() {
        let mut eval = eval();
        let mut ctx = eval.root("/srv/recipes/default.yml", Scope::new());
        let err = ctx.declare("cron", "backup", None).unwrap_err();
        assert!(matches!(err, RecipeError::UnknownOperation(ref k) if k == "cron"));
    }

    #[test]
    fn test_ck004_define_reserved_rejected() {
        let mut eval = eval();
        let mut ctx = eval.root("/srv/recipes/default.yml", Scope::new());
        for name in ["package", "template", "include_recipe", "define"] {
            let err = ctx
                .define(name, IndexMap::new(), DefinitionBody::Statements(Vec::new()))
                .unwrap_err();
            assert!(matches!(err, RecipeError::ReservedKeyword(_)), "{name}");
        }
    }

    #[test]
    fn test_ck004_definition_invocations_are_independent() {
        let mut eval = eval();
        let mut ctx = eval.root("/srv/recipes/default.yml", Scope::new());
        let root = ctx.recipe_id();
        let mut params = IndexMap::new();
        params.insert("port".to_string(), Value::Number(80.into()));
        ctx.define(
            "vhost",
            params,
            DefinitionBody::native(|ctx| {
                let params = ctx.var("params").unwrap_or(Value::Null);
                let name = params["name"].as_str().unwrap_or_default().to_string();
                let port = params["port"].as_u64().unwrap_or_default();
                ctx.template(
                    &format!("/etc/nginx/sites/{}", name),
                    Some(Block::new().attr("listen", port)),
                )
            }),
        )
        .unwrap();
        ctx.declare("vhost", "a.example", None).unwrap();
        ctx.declare("vhost", "b.example", Some(Block::new().attr("port", 8080)))
            .unwrap();

        let graph = eval.graph();
        let children = graph.recipe(root).children();
        assert_eq!(children.len(), 2);
        let subs: Vec<RecipeId> = children
            .iter()
            .map(|c| match c {
                Child::Recipe(id) => *id,
                Child::Resource(_) => panic!("expected definition recipes"),
            })
            .collect();
        assert_eq!(
            graph.recipe(subs[0]).kind(),
            &RecipeKind::Definition {
                definition: "vhost".into(),
                name: "a.example".into()
            }
        );
        let a = graph.recipe(subs[0]).resources().next().unwrap();
        let b = graph.recipe(subs[1]).resources().next().unwrap();
        assert_eq!(a.resource_name(), "/etc/nginx/sites/a.example");
        assert_eq!(a.attribute("listen"), Some(&Value::Number(80.into())));
        assert_eq!(b.resource_name(), "/etc/nginx/sites/b.example");
        assert_eq!(b.attribute("listen"), Some(&Value::Number(8080.into())));
        assert_eq!(a.recipe(), subs[0]);
    }

    #[test]
    fn test_ck004_definition_scope_does_not_leak() {
        let mut eval = eval();
        let mut ctx = eval.root("/srv/recipes/default.yml", Scope::new());
        ctx.define(
            "noop",
            IndexMap::new(),
            DefinitionBody::native(|ctx| {
                assert!(ctx.var("params").is_some());
                Ok(())
            }),
        )
        .unwrap();
        ctx.declare("noop", "x", None).unwrap();
        assert!(ctx.var("params").is_none());
    }

    #[test]
    fn test_ck004_definition_error_propagates() {
        let mut eval = eval();
        let mut ctx = eval.root("/srv/recipes/default.yml", Scope::new());
        ctx.define(
            "broken",
            IndexMap::new(),
            DefinitionBody::native(|ctx| ctx.declare("nope", "x", None)),
        )
        .unwrap();
        let err = ctx.declare("broken", "x", None).unwrap_err();
        assert!(matches!(err, RecipeError::UnknownOperation(_)));
    }

    #[test]
    fn test_ck004_evaluate_statements() {
        let statements = crate::core::parser::parse_recipe(
            r#"
- package: "{{ pkg }}"
- service: nginx
  with: { action: [enable, start] }
"#,
            std::path::Path::new("/srv/recipes/default.yml"),
        )
        .unwrap();
        let mut eval = eval();
        let mut ctx = eval.root(
            "/srv/recipes/default.yml",
            Scope::new().with("pkg", Value::String("nginx-full".into())),
        );
        let root = ctx.recipe_id();
        ctx.evaluate(&statements).unwrap();
        assert_eq!(names(&eval, root), vec!["package[nginx-full]", "service[nginx]"]);
    }

    #[test]
    fn test_ck004_is_reserved() {
        assert!(is_reserved("service"));
        assert!(is_reserved("notifies"));
        assert!(!is_reserved("vhost"));
    }
}
