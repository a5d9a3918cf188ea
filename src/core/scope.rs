//! CK-003: Variable scope and `{{ }}` placeholder resolution.
//!
//! A scope maps names to bindings. A binding is either a constant value or a
//! lazy computation re-run on every read. Scopes are immutable: nested
//! contexts get a merged copy via [`Scope::extend`], never a mutation of the
//! parent.

use super::error::RecipeError;
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::fmt;
use std::rc::Rc;

/// Lazily computed value. Receives the optional call argument.
pub type LazyFn = Rc<dyn Fn(Option<&Value>) -> Value>;

/// One entry in a scope.
#[derive(Clone)]
pub enum Binding {
    /// Constant value.
    Value(Value),
    /// Computed on every access.
    Lazy(LazyFn),
}

impl Binding {
    /// Wrap a zero/one-argument closure as a lazy binding.
    pub fn lazy(f: impl Fn(Option<&Value>) -> Value + 'static) -> Self {
        Self::Lazy(Rc::new(f))
    }

    fn read(&self, arg: Option<&Value>) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Lazy(f) => f(arg),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// Immutable name → binding mapping shared by an evaluation context.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: Rc<IndexMap<String, Binding>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for root scopes. Clones the backing map only when it is shared.
    pub fn with(mut self, name: impl Into<String>, binding: impl Into<Binding>) -> Self {
        Rc::make_mut(&mut self.vars).insert(name.into(), binding.into());
        self
    }

    /// A new scope holding every entry of `self` plus `name`. `self` is untouched.
    pub fn extend(&self, name: impl Into<String>, binding: impl Into<Binding>) -> Self {
        let mut vars = (*self.vars).clone();
        vars.insert(name.into(), binding.into());
        Self {
            vars: Rc::new(vars),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Read a binding. Lazy bindings are invoked without an argument.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).map(|b| b.read(None))
    }

    /// Read a binding, passing `arg` to lazy bindings. Constants ignore it.
    pub fn call(&self, name: &str, arg: &Value) -> Option<Value> {
        self.vars.get(name).map(|b| b.read(Some(arg)))
    }

    /// Look up a dotted path such as `node.network.0.addr`.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut parts = path.split('.');
        let root = self.get(parts.next()?.trim())?;
        parts.try_fold(root, |current, key| index_value(&current, key.trim()))
    }

    /// Resolve every `{{ path }}` placeholder in `template`.
    pub fn resolve_template(&self, template: &str) -> Result<String, RecipeError> {
        let mut result = template.to_string();
        let mut start = 0;

        while let Some(open) = result[start..].find("{{") {
            let open = start + open;
            let Some(close) = result[open..].find("}}") else {
                // Unterminated braces are literal text.
                break;
            };
            let close = open + close + 2;
            let key = result[open + 2..close - 2].trim().to_string();

            let value = self
                .lookup(&key)
                .map(|v| value_to_string(&v))
                .ok_or_else(|| RecipeError::UndefinedVariable {
                    name: key.clone(),
                    template: template.to_string(),
                })?;

            result.replace_range(open..close, &value);
            start = open + value.len();
        }

        Ok(result)
    }

    /// Resolve placeholders inside a value, recursing into sequences and
    /// mappings. A string that is exactly one placeholder keeps the bound
    /// value's type.
    pub fn resolve_value(&self, value: &Value) -> Result<Value, RecipeError> {
        match value {
            Value::String(s) => {
                if let Some(key) = whole_placeholder(s) {
                    return self
                        .lookup(key)
                        .ok_or_else(|| RecipeError::UndefinedVariable {
                            name: key.to_string(),
                            template: s.clone(),
                        });
                }
                Ok(Value::String(self.resolve_template(s)?))
            }
            Value::Sequence(items) => items
                .iter()
                .map(|v| self.resolve_value(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Sequence),
            Value::Mapping(map) => {
                let mut out = serde_yaml_ng::Mapping::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve_value(v)?);
                }
                Ok(Value::Mapping(out))
            }
            other => Ok(other.clone()),
        }
    }
}

/// Returns the inner key when `s` is a single `{{ key }}` and nothing else.
fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn index_value(value: &Value, key: &str) -> Option<Value> {
    match value {
        Value::Mapping(map) => map.get(key).cloned(),
        Value::Sequence(items) => key.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
        _ => None,
    }
}

/// Render a value for string interpolation.
pub fn value_to_string(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn node() -> Value {
        serde_yaml_ng::from_str(
            r#"
hostname: web-1
cpus: 4
network:
  - addr: 10.0.0.5
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ck003_constant_binding() {
        let scope = Scope::new().with("role", Value::String("web".into()));
        assert_eq!(scope.get("role"), Some(Value::String("web".into())));
        assert_eq!(scope.get("missing"), None);
    }

    #[test]
    fn test_ck003_lazy_binding_invoked_every_read() {
        let counter = Rc::new(Cell::new(0u64));
        let c = Rc::clone(&counter);
        let scope = Scope::new().with(
            "tick",
            Binding::lazy(move |_| {
                c.set(c.get() + 1);
                Value::Number(c.get().into())
            }),
        );
        assert_eq!(scope.get("tick"), Some(Value::Number(1.into())));
        assert_eq!(scope.get("tick"), Some(Value::Number(2.into())));
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_ck003_lazy_binding_with_argument() {
        let scope = Scope::new().with(
            "upcase",
            Binding::lazy(|arg| match arg {
                Some(Value::String(s)) => Value::String(s.to_uppercase()),
                _ => Value::Null,
            }),
        );
        assert_eq!(
            scope.call("upcase", &Value::String("nginx".into())),
            Some(Value::String("NGINX".into()))
        );
        assert_eq!(scope.get("upcase"), Some(Value::Null));
    }

    #[test]
    fn test_ck003_extend_leaves_parent_untouched() {
        let parent = Scope::new().with("a", Value::Bool(true));
        let child = parent.extend("params", Value::Null);
        assert!(child.contains("a"));
        assert!(child.contains("params"));
        assert!(!parent.contains("params"));
    }

    #[test]
    fn test_ck003_extend_shadows_parent_entry() {
        let parent = Scope::new().with("params", Value::String("outer".into()));
        let child = parent.extend("params", Value::String("inner".into()));
        assert_eq!(child.get("params"), Some(Value::String("inner".into())));
        assert_eq!(parent.get("params"), Some(Value::String("outer".into())));
    }

    #[test]
    fn test_ck003_resolve_template_paths() {
        let scope = Scope::new().with("node", node());
        let out = scope
            .resolve_template("{{ node.hostname }}:{{node.network.0.addr}} x{{ node.cpus }}")
            .unwrap();
        assert_eq!(out, "web-1:10.0.0.5 x4");
    }

    #[test]
    fn test_ck003_resolve_template_undefined() {
        let scope = Scope::new();
        let err = scope.resolve_template("hello {{ who }}").unwrap_err();
        assert!(matches!(err, RecipeError::UndefinedVariable { ref name, .. } if name == "who"));
    }

    #[test]
    fn test_ck003_unterminated_placeholder_is_literal() {
        let scope = Scope::new();
        assert_eq!(scope.resolve_template("a {{ b").unwrap(), "a {{ b");
    }

    #[test]
    fn test_ck003_whole_placeholder_keeps_type() {
        let scope = Scope::new().with("node", node());
        let v = scope
            .resolve_value(&Value::String("{{ node.cpus }}".into()))
            .unwrap();
        assert_eq!(v, Value::Number(4.into()));
        let v = scope
            .resolve_value(&Value::String("cpus={{ node.cpus }}".into()))
            .unwrap();
        assert_eq!(v, Value::String("cpus=4".into()));
    }

    #[test]
    fn test_ck003_resolve_value_recurses() {
        let scope = Scope::new().with("node", node());
        let input: Value = serde_yaml_ng::from_str(
            r#"
names: ["{{ node.hostname }}", plain]
nested: { host: "{{ node.hostname }}" }
"#,
        )
        .unwrap();
        let out = scope.resolve_value(&input).unwrap();
        assert_eq!(out["names"][0], Value::String("web-1".into()));
        assert_eq!(out["names"][1], Value::String("plain".into()));
        assert_eq!(out["nested"]["host"], Value::String("web-1".into()));
    }

    #[test]
    fn test_ck003_value_to_string() {
        assert_eq!(value_to_string(&Value::String("hello".into())), "hello");
        assert_eq!(value_to_string(&Value::Bool(true)), "true");
        assert_eq!(value_to_string(&Value::Null), "");
        assert_eq!(
            value_to_string(&Value::Sequence(vec![Value::Number(1.into())])),
            "[1]"
        );
    }
}
