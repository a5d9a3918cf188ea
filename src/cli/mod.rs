//! CK-011: CLI subcommands (plan, validate).

use crate::core::types::{Child, RecipeGraph, RecipeId, RecipeKind};
use crate::core::{Evaluation, Scope};
use clap::{Subcommand, ValueEnum};
use serde_yaml_ng::{Mapping, Value};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate recipes and show the resulting resource tree
    Plan {
        /// Recipe files to evaluate, in order
        #[arg(required = true)]
        recipes: Vec<PathBuf>,

        /// Node attributes from a YAML file
        #[arg(short = 'y', long)]
        node_yaml: Option<PathBuf>,

        /// Node attributes from a JSON file (merged after YAML)
        #[arg(short = 'j', long)]
        node_json: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Evaluate recipes and check every notification resolves
    Validate {
        /// Recipe files to evaluate, in order
        #[arg(required = true)]
        recipes: Vec<PathBuf>,

        /// Node attributes from a YAML file
        #[arg(short = 'y', long)]
        node_yaml: Option<PathBuf>,

        /// Node attributes from a JSON file (merged after YAML)
        #[arg(short = 'j', long)]
        node_json: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Plan {
            recipes,
            node_yaml,
            node_json,
            format,
        } => cmd_plan(&recipes, node_yaml.as_deref(), node_json.as_deref(), format),
        Commands::Validate {
            recipes,
            node_yaml,
            node_json,
        } => cmd_validate(&recipes, node_yaml.as_deref(), node_json.as_deref()),
    }
}

fn cmd_plan(
    recipes: &[PathBuf],
    node_yaml: Option<&Path>,
    node_json: Option<&Path>,
    format: OutputFormat,
) -> Result<(), String> {
    let node = load_node(node_yaml, node_json)?;
    let eval = evaluate(recipes, node)?;
    let graph = eval.graph();
    let resolved = graph.resolve_notifications().map_err(|e| e.to_string())?;

    match format {
        OutputFormat::Text => {
            print!("{}", render_tree(graph));
            println!();
            println!(
                "Plan: {} recipes, {} resources, {} notifications.",
                graph.len(),
                graph.resources().len(),
                resolved.len()
            );
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(graph)
                .map_err(|e| format!("JSON serialization error: {}", e))?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn cmd_validate(
    recipes: &[PathBuf],
    node_yaml: Option<&Path>,
    node_json: Option<&Path>,
) -> Result<(), String> {
    let node = load_node(node_yaml, node_json)?;
    let eval = evaluate(recipes, node)?;
    let graph = eval.graph();
    let resolved = graph.resolve_notifications().map_err(|e| e.to_string())?;
    println!(
        "OK: {} recipes, {} resources, {} notifications, {} definitions",
        graph.len(),
        graph.resources().len(),
        resolved.len(),
        eval.definitions().len()
    );
    Ok(())
}

/// Evaluate every recipe into one graph with `node` bound in scope.
fn evaluate(recipes: &[PathBuf], node: Value) -> Result<Evaluation, String> {
    let scope = Scope::new().with("node", node);
    let mut eval = Evaluation::new();
    for recipe in recipes {
        eval.load(recipe, &scope).map_err(|e| e.to_string())?;
    }
    tracing::info!(
        "Evaluated {} recipe file(s) into {} resources",
        recipes.len(),
        eval.graph().resources().len()
    );
    Ok(eval)
}

/// Build the node attribute mapping. JSON keys override YAML keys.
pub fn load_node(yaml: Option<&Path>, json: Option<&Path>) -> Result<Value, String> {
    let mut node = Mapping::new();
    if let Some(path) = yaml {
        let content = read(path)?;
        let value: Value = serde_yaml_ng::from_str(&content)
            .map_err(|e| format!("YAML parse error in {}: {}", path.display(), e))?;
        merge_node(&mut node, value, path)?;
    }
    if let Some(path) = json {
        let content = read(path)?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| format!("JSON parse error in {}: {}", path.display(), e))?;
        merge_node(&mut node, value, path)?;
    }
    Ok(Value::Mapping(node))
}

fn read(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

fn merge_node(node: &mut Mapping, value: Value, source: &Path) -> Result<(), String> {
    match value {
        Value::Mapping(entries) => {
            for (key, value) in entries {
                node.insert(key, value);
            }
            Ok(())
        }
        Value::Null => Ok(()),
        _ => Err(format!(
            "{}: node attributes must be a mapping",
            source.display()
        )),
    }
}

/// Render the recipe tree, one line per recipe, resource, and notification.
pub fn render_tree(graph: &RecipeGraph) -> String {
    let mut out = String::new();
    for &root in graph.roots() {
        render_recipe(graph, root, 0, &mut out);
    }
    out
}

fn render_recipe(graph: &RecipeGraph, id: RecipeId, depth: usize, out: &mut String) {
    let recipe = graph.recipe(id);
    let pad = "  ".repeat(depth);
    out.push_str(&match recipe.kind() {
        RecipeKind::File => format!("{}Recipe: {}\n", pad, recipe.path().display()),
        RecipeKind::Definition { definition, name } => {
            format!("{}Definition: {}[{}]\n", pad, definition, name)
        }
    });
    for child in recipe.children() {
        match child {
            Child::Resource(resource) => {
                out.push_str(&format!(
                    "{}  {} ({})\n",
                    pad,
                    resource.descriptor(),
                    resource.actions().join(", ")
                ));
                for n in resource.notifications() {
                    out.push_str(&format!(
                        "{}    notifies {} {} ({})\n",
                        pad,
                        n.action(),
                        n.target_resource_desc(),
                        n.timing()
                    ));
                }
            }
            Child::Recipe(nested) => render_recipe(graph, *nested, depth + 1, out),
        }
    }
}
