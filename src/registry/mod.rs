//! Function registry: name → transformation bindings.
//!
//! Every transformation function, built-in or host-supplied, has the same
//! uniform signature: it receives the execution context and its arguments and
//! returns a document. There is no probing for what a function accepts; the
//! context is always passed explicitly.
//!
//! Bindings live in a [`FunctionRegistry`]. A child engine context processing
//! an included document inherits a clone of the parent's registry and may add
//! more bindings on top; additions never propagate back to the parent.
//!
//! Host applications group their functions into named [`FunctionSet`]s and
//! register them on the session; a document selects one by name through
//! `_meta.transformation_module`. Registering the *same* binding twice is a
//! no-op, registering a different implementation under a taken name fails
//! with [`YmxError::ConflictingBinding`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::core::YmxError;
use crate::document::{Document, Mapping};
use crate::engine::ExecContext;
use crate::template::TemplateArgs;

/// Result type of every transformation function.
pub type TransformResult = anyhow::Result<Document>;

/// The uniform transformation-function contract.
pub type TransformFn = dyn Fn(&ExecContext<'_>, Arguments) -> TransformResult + Send + Sync;

/// Arguments of an invocation node, resolved before the call.
///
/// A mapping `_a` is passed as named arguments; any other node is passed as
/// a single positional value.
#[derive(Debug, Clone)]
pub enum Arguments {
    /// Named arguments from a mapping `_a`.
    Named(Mapping),
    /// A single positional argument.
    Positional(Document),
}

impl Arguments {
    /// Classifies a resolved `_a` node.
    #[must_use]
    pub fn from_value(value: Document) -> Self {
        match value {
            Document::Mapping(mapping) => Self::Named(mapping),
            other => Self::Positional(other),
        }
    }

    /// The named argument `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Document> {
        match self {
            Self::Named(mapping) => mapping.get(name),
            Self::Positional(_) => None,
        }
    }

    /// The named argument `name`.
    ///
    /// # Errors
    ///
    /// Fails when the argument is absent or the arguments are positional.
    pub fn required(&self, name: &str) -> anyhow::Result<&Document> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("missing required argument '{name}'"))
    }

    /// The named string argument `name`.
    ///
    /// # Errors
    ///
    /// Fails when the argument is absent or not a string scalar.
    pub fn required_str(&self, name: &str) -> anyhow::Result<&str> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("argument '{name}' must be a string"))
    }

    /// The optional string argument `name`.
    ///
    /// # Errors
    ///
    /// Fails when the argument is present but not a string scalar.
    pub fn optional_str(&self, name: &str) -> anyhow::Result<Option<&str>> {
        self.get(name)
            .map(|value| {
                value
                    .as_str()
                    .ok_or_else(|| anyhow::anyhow!("argument '{name}' must be a string"))
            })
            .transpose()
    }

    /// The named non-negative integer argument `name`.
    ///
    /// # Errors
    ///
    /// Fails when the argument is absent, not an integer, or negative.
    pub fn required_u64(&self, name: &str) -> anyhow::Result<u64> {
        self.required(name)?
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("argument '{name}' must be a non-negative integer"))
    }

    /// The optional boolean argument `name`, defaulting to `false`.
    ///
    /// # Errors
    ///
    /// Fails when the argument is present but not a boolean.
    pub fn optional_bool(&self, name: &str) -> anyhow::Result<bool> {
        self.get(name)
            .map(|value| {
                value
                    .as_bool()
                    .ok_or_else(|| anyhow::anyhow!("argument '{name}' must be a boolean"))
            })
            .transpose()
            .map(|value| value.unwrap_or(false))
    }

    /// The optional `name` argument as template arguments.
    ///
    /// Scalar values are rendered to their textual form; an absent argument
    /// yields an empty map.
    ///
    /// # Errors
    ///
    /// Fails when the argument is not a mapping of string keys to scalars.
    pub fn template_args(&self, name: &str) -> anyhow::Result<TemplateArgs> {
        let Some(value) = self.get(name) else {
            return Ok(TemplateArgs::new());
        };
        let mapping = value
            .as_mapping()
            .ok_or_else(|| anyhow::anyhow!("argument '{name}' must be a mapping"))?;
        let mut args = TemplateArgs::new();
        for (key, value) in mapping {
            let key = key
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("argument '{name}' must use string keys"))?;
            let text = scalar_text(value).ok_or_else(|| {
                anyhow::anyhow!("argument '{name}.{key}' must be a scalar value")
            })?;
            args.insert(key.to_string(), text);
        }
        Ok(args)
    }
}

/// Renders a scalar node to the text a template placeholder expands to.
#[must_use]
pub fn scalar_text(value: &Document) -> Option<String> {
    match value {
        Document::Null => Some(String::new()),
        Document::Bool(b) => Some(b.to_string()),
        Document::Number(n) => Some(n.to_string()),
        Document::String(s) => Some(s.clone()),
        Document::Sequence(_) | Document::Mapping(_) | Document::Tagged(_) => None,
    }
}

/// A named bundle of transformation functions.
///
/// This is the plugin surface: hosts build a set at startup and register it
/// on the session under the name documents reference via
/// `_meta.transformation_module`.
#[derive(Clone, Default)]
pub struct FunctionSet {
    functions: Vec<(String, Arc<TransformFn>)>,
}

impl FunctionSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function to the set.
    #[must_use]
    pub fn function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&ExecContext<'_>, Arguments) -> TransformResult + Send + Sync + 'static,
    {
        self.functions.push((name.into(), Arc::new(function)));
        self
    }

    /// Iterates over the bindings in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<TransformFn>)> {
        self.functions.iter().map(|(name, f)| (name.as_str(), f))
    }

    /// Number of bindings in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Name → implementation bindings for one engine context.
///
/// Cloning a registry is cheap (bindings are `Arc`s) and is how child
/// contexts inherit their parent's functions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    bindings: HashMap<String, Arc<TransformFn>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one binding.
    ///
    /// Re-registering the identical implementation is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`YmxError::ConflictingBinding`] when `name` is already bound
    /// to a different implementation.
    pub fn register(&mut self, name: &str, function: Arc<TransformFn>) -> Result<(), YmxError> {
        if let Some(existing) = self.bindings.get(name) {
            if Arc::ptr_eq(existing, &function) {
                return Ok(());
            }
            return Err(YmxError::ConflictingBinding {
                name: name.to_string(),
            });
        }
        debug!(function = name, "registered transformation function");
        self.bindings.insert(name.to_string(), function);
        Ok(())
    }

    /// Registers every binding of a set.
    ///
    /// # Errors
    ///
    /// Returns [`YmxError::ConflictingBinding`] on the first conflicting
    /// name; earlier bindings of the set remain registered.
    pub fn register_set(&mut self, set: &FunctionSet) -> Result<(), YmxError> {
        for (name, function) in set.iter() {
            self.register(name, Arc::clone(function))?;
        }
        Ok(())
    }

    /// Looks up a binding by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<TransformFn>> {
        self.bindings.get(name).cloned()
    }

    /// Whether `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the registry has no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<TransformFn> {
        Arc::new(|_ctx, _args| Ok(Document::Null))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = FunctionRegistry::new();
        registry.register("f", noop()).unwrap();
        assert!(registry.contains("f"));
        assert!(registry.get("f").is_some());
        assert!(registry.get("g").is_none());
    }

    #[test]
    fn test_identical_reregistration_is_noop() {
        let f = noop();
        let mut registry = FunctionRegistry::new();
        registry.register("f", Arc::clone(&f)).unwrap();
        registry.register("f", Arc::clone(&f)).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_conflicting_registration_fails() {
        let mut registry = FunctionRegistry::new();
        registry.register("f", noop()).unwrap();
        let err = registry.register("f", noop()).unwrap_err();
        assert!(matches!(err, YmxError::ConflictingBinding { name } if name == "f"));
    }

    #[test]
    fn test_same_set_registered_twice_succeeds() {
        let set = FunctionSet::new()
            .function("f", |_ctx, _args| Ok(Document::Null))
            .function("g", |_ctx, _args| Ok(Document::Null));
        let mut registry = FunctionRegistry::new();
        registry.register_set(&set).unwrap();
        registry.register_set(&set).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_child_additions_invisible_to_parent() {
        let mut parent = FunctionRegistry::new();
        parent.register("f", noop()).unwrap();

        let mut child = parent.clone();
        child.register("g", noop()).unwrap();

        assert!(child.contains("f"));
        assert!(child.contains("g"));
        assert!(!parent.contains("g"));
    }

    #[test]
    fn test_named_argument_accessors() {
        let args = Arguments::from_value(
            serde_yaml::from_str("{file: a.yaml, count: 3, flag: true}").unwrap(),
        );
        assert_eq!(args.required_str("file").unwrap(), "a.yaml");
        assert_eq!(args.required_u64("count").unwrap(), 3);
        assert!(args.optional_bool("flag").unwrap());
        assert!(!args.optional_bool("absent").unwrap());
        assert!(args.required("missing").is_err());
        assert!(args.required_str("count").is_err());
    }

    #[test]
    fn test_positional_arguments() {
        let args = Arguments::from_value(serde_yaml::from_str("[1, 2]").unwrap());
        assert!(matches!(args, Arguments::Positional(_)));
        assert!(args.required("anything").is_err());
    }

    #[test]
    fn test_template_args_renders_scalars() {
        let args = Arguments::from_value(
            serde_yaml::from_str("{template_args: {a: 1, b: text, c: true}}").unwrap(),
        );
        let rendered = args.template_args("template_args").unwrap();
        assert_eq!(rendered.get("a").map(String::as_str), Some("1"));
        assert_eq!(rendered.get("b").map(String::as_str), Some("text"));
        assert_eq!(rendered.get("c").map(String::as_str), Some("true"));

        let empty = args.template_args("absent").unwrap();
        assert!(empty.is_empty());

        let bad = Arguments::from_value(
            serde_yaml::from_str("{template_args: {a: [1]}}").unwrap(),
        );
        assert!(bad.template_args("template_args").is_err());
    }
}
