//! The recursive macro interpreter.
//!
//! A [`Session`] owns all state an expansion run needs: the root function
//! registry, host-registered plugin sets, the document cache, and the
//! optional schema codec. Nothing is global; concurrent or repeated runs
//! against separate sessions share no hidden state.
//!
//! # Expansion algorithm
//!
//! The engine walks a document depth-first:
//!
//! 1. Sequences are transformed element by element in index order, so side
//!    effects (file loads triggered by elements) follow element order.
//! 2. An invocation node has its `_a` value transformed *first* - arguments
//!    may themselves contain invocation nodes - then `_f` is looked up in
//!    the active registry and invoked. The return value replaces the node
//!    and is not re-walked; a function wanting sub-content expanded recurses
//!    into the engine explicitly.
//! 3. Any other mapping has its values transformed, keys and order
//!    unchanged.
//! 4. Scalars pass through untouched.
//!
//! A failure anywhere aborts the whole expansion; there is no partial
//! output. Failures inside function implementations are wrapped exactly once
//! with the function name and current file; errors that already carry file
//! context (they originated deeper, in an included document) propagate
//! unchanged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, trace};

use crate::cache::{CacheEntry, CacheKey, DocumentCache};
use crate::codec::SchemaCodec;
use crate::core::YmxError;
use crate::core::error::chain_has_file_context;
use crate::document::{
    self, ARGUMENTS_KEY, Document, FUNCTION_KEY, Mapping, Metadata,
};
use crate::functions;
use crate::registry::{Arguments, FunctionRegistry, FunctionSet, TransformFn, TransformResult};
use crate::template::{self, TemplateArgs};

/// Top-level owner of expansion state.
///
/// Construct one per logical run (or share one across runs to reuse the
/// document cache), register host functions and plugin sets, then call
/// [`load_document`](Self::load_document) or [`transform`](Self::transform).
pub struct Session {
    registry: FunctionRegistry,
    plugin_sets: HashMap<String, FunctionSet>,
    cache: DocumentCache,
    in_flight: DashSet<CacheKey>,
    codec: Option<Arc<dyn SchemaCodec>>,
}

impl Session {
    /// Creates a session with the full built-in function set.
    #[must_use]
    pub fn new() -> Self {
        Self::with_builtins(functions::builtins(true))
    }

    /// Creates a session whose built-ins exclude the expression evaluator.
    #[must_use]
    pub fn without_expression_eval() -> Self {
        Self::with_builtins(functions::builtins(false))
    }

    fn with_builtins(builtins: FunctionSet) -> Self {
        let mut registry = FunctionRegistry::new();
        registry.register_set(&builtins).expect("built-in names are unique");
        Self {
            registry,
            plugin_sets: HashMap::new(),
            cache: DocumentCache::new(),
            in_flight: DashSet::new(),
            codec: None,
        }
    }

    /// Attaches the schema codec collaborator.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn SchemaCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// The configured codec, if any.
    #[must_use]
    pub fn codec(&self) -> Option<&Arc<dyn SchemaCodec>> {
        self.codec.as_ref()
    }

    /// The session's document cache.
    #[must_use]
    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    /// Registers a single function on the session's root registry.
    ///
    /// # Errors
    ///
    /// Returns [`YmxError::ConflictingBinding`] when the name is taken by a
    /// different implementation.
    pub fn register_function<F>(&mut self, name: &str, function: F) -> Result<(), YmxError>
    where
        F: Fn(&ExecContext<'_>, Arguments) -> TransformResult + Send + Sync + 'static,
    {
        self.registry.register(name, Arc::new(function))
    }

    /// Registers a named plugin set.
    ///
    /// Documents select a set through `_meta.transformation_module`; its
    /// functions are added to that document's registry (and inherited by its
    /// includes) before transformation.
    pub fn register_plugin_set(&mut self, name: impl Into<String>, set: FunctionSet) {
        let name = name.into();
        debug!(module = %name, functions = set.len(), "registered plugin set");
        self.plugin_sets.insert(name, set);
    }

    fn plugin_set(&self, name: &str) -> Option<&FunctionSet> {
        self.plugin_sets.get(name)
    }

    /// Loads, templates, and fully transforms the document at `path`.
    ///
    /// Results are memoized per `(canonical path, template args)`; repeated
    /// loads return an independent deep copy without touching the disk.
    /// `parent` seeds the document's registry (used for includes, so nested
    /// documents see the including document's functions); the session's root
    /// registry is used when `parent` is `None`.
    ///
    /// # Errors
    ///
    /// [`YmxError::DocumentRead`], [`YmxError::DocumentParse`],
    /// [`YmxError::UnknownPluginSource`], [`YmxError::ConflictingBinding`],
    /// [`YmxError::CircularInclude`], or any expansion failure from the
    /// transformed tree.
    pub fn load_document(
        &self,
        path: &Path,
        template_args: &TemplateArgs,
        parent: Option<&FunctionRegistry>,
    ) -> anyhow::Result<(Document, Option<Metadata>)> {
        // Lexical absolutization only: the key must stay derivable while the
        // file no longer exists, so cached entries outlive their source.
        let canonical = std::path::absolute(path).map_err(|e| YmxError::DocumentRead {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let key = CacheKey::new(canonical.clone(), template_args.clone());
        if let Some(entry) = self.cache.get(&key) {
            return Ok((entry.document, entry.metadata));
        }

        // A cache miss for a key whose expansion is still running means the
        // include chain looped back to this document.
        if !self.in_flight.insert(key.clone()) {
            return Err(YmxError::CircularInclude {
                file: canonical.display().to_string(),
            }
            .into());
        }
        let result = self.expand_document(&canonical, path, template_args, parent);
        self.in_flight.remove(&key);

        let (transformed, metadata) = result?;
        self.cache.insert(
            key,
            CacheEntry {
                document: transformed.clone(),
                metadata: metadata.clone(),
            },
        );
        Ok((transformed, metadata))
    }

    fn expand_document(
        &self,
        canonical: &Path,
        path: &Path,
        template_args: &TemplateArgs,
        parent: Option<&FunctionRegistry>,
    ) -> anyhow::Result<(Document, Option<Metadata>)> {
        debug!(path = %canonical.display(), "loading document");
        let source =
            std::fs::read_to_string(canonical).map_err(|e| YmxError::DocumentRead {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let source = template::substitute(&source, template_args);
        let mut root = document::parse_document(&source, canonical)?;
        let metadata = document::extract_metadata(&mut root, canonical)?;

        let mut registry = parent.cloned().unwrap_or_else(|| self.registry.clone());
        if let Some(module) = metadata.as_ref().and_then(|m| m.transformation_module.as_deref()) {
            let set = self.plugin_set(module).ok_or_else(|| {
                YmxError::UnknownPluginSource {
                    name: module.to_string(),
                    file: canonical.display().to_string(),
                }
            })?;
            registry.register_set(set)?;
        }

        let ctx = ExecContext {
            session: self,
            file: canonical,
            registry: &registry,
            template_args,
        };
        let transformed = ctx.transform(root)?;
        Ok((transformed, metadata))
    }

    /// Transforms an in-memory document against the session's root registry.
    ///
    /// `file` is used for error context and relative-path resolution of any
    /// includes the document triggers.
    ///
    /// # Errors
    ///
    /// Any expansion failure; see [`load_document`](Self::load_document).
    pub fn transform(
        &self,
        document: Document,
        file: &Path,
        template_args: &TemplateArgs,
    ) -> anyhow::Result<Document> {
        let ctx = ExecContext {
            session: self,
            file,
            registry: &self.registry,
            template_args,
        };
        ctx.transform(document)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution context handed to every transformation function.
///
/// Exposes the current document's location (for resolving relative include
/// paths), the active registry (so includes inherit the caller's bindings),
/// the owning session, and the template arguments of the current expansion.
pub struct ExecContext<'a> {
    session: &'a Session,
    file: &'a Path,
    registry: &'a FunctionRegistry,
    template_args: &'a TemplateArgs,
}

impl<'a> ExecContext<'a> {
    /// The document currently being expanded.
    #[must_use]
    pub fn file(&self) -> &Path {
        self.file
    }

    /// The owning session.
    #[must_use]
    pub fn session(&self) -> &Session {
        self.session
    }

    /// The registry active for the current document.
    #[must_use]
    pub fn registry(&self) -> &FunctionRegistry {
        self.registry
    }

    /// Template arguments of the current expansion, passed through for
    /// functions that forward them.
    #[must_use]
    pub fn template_args(&self) -> &TemplateArgs {
        self.template_args
    }

    /// Resolves a path against the current document's directory.
    ///
    /// Absolute paths are returned unchanged; relative paths resolve against
    /// the directory of the *including* document, never the process working
    /// directory.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.file.parent() {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    /// Loads an external document through the cache, inheriting this
    /// context's registry.
    ///
    /// # Errors
    ///
    /// See [`Session::load_document`].
    pub fn load_relative(
        &self,
        file: &str,
        template_args: &TemplateArgs,
    ) -> anyhow::Result<(Document, Option<Metadata>)> {
        self.session
            .load_document(&self.resolve_path(file), template_args, Some(self.registry))
    }

    /// Recursively expands a document node.
    ///
    /// This is the depth-first interpreter described in the module docs;
    /// function implementations call it to expand sub-content they want
    /// resolved.
    ///
    /// # Errors
    ///
    /// Any expansion failure in the subtree.
    pub fn transform(&self, value: Document) -> anyhow::Result<Document> {
        match value {
            Document::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.transform(item)?);
                }
                Ok(Document::Sequence(out))
            }
            Document::Mapping(mapping) => match split_invocation(mapping) {
                Ok((name, raw_args)) => self.invoke(&name, raw_args),
                Err(mapping) => {
                    let mut out = Mapping::with_capacity(mapping.len());
                    for (key, value) in mapping {
                        out.insert(key, self.transform(value)?);
                    }
                    Ok(Document::Mapping(out))
                }
            },
            scalar => Ok(scalar),
        }
    }

    /// Expands one invocation node: resolve arguments, look up, invoke.
    fn invoke(&self, name: &str, raw_args: Document) -> anyhow::Result<Document> {
        // Arguments are resolved before the invocation itself.
        let resolved = self.transform(raw_args)?;

        let function: Arc<TransformFn> =
            self.registry.get(name).ok_or_else(|| YmxError::UnknownFunction {
                name: name.to_string(),
                file: self.file.display().to_string(),
            })?;

        trace!(function = name, file = %self.file.display(), "expanding invocation node");
        function(self, Arguments::from_value(resolved)).map_err(|err| {
            if chain_has_file_context(&err) {
                // Already carries file context from deeper in the expansion;
                // wrapping again would duplicate the prefix.
                err
            } else {
                YmxError::Transformation {
                    function: name.to_string(),
                    file: self.file.display().to_string(),
                    reason: format!("{err:#}"),
                }
                .into()
            }
        })
    }
}

/// Consumes a mapping, splitting it into `(function name, arguments)` when
/// it is an invocation node; gives the mapping back otherwise.
fn split_invocation(mut mapping: Mapping) -> Result<(String, Document), Mapping> {
    if mapping.len() != 2 || !mapping.contains_key(ARGUMENTS_KEY) {
        return Err(mapping);
    }
    let Some(name) = mapping.get(FUNCTION_KEY).and_then(Document::as_str) else {
        return Err(mapping);
    };
    let name = name.to_string();
    match mapping.remove(ARGUMENTS_KEY) {
        Some(args) => Ok((name, args)),
        None => Err(mapping),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn yaml(source: &str) -> Document {
        serde_yaml::from_str(source).unwrap()
    }

    fn transform(session: &Session, source: &str) -> anyhow::Result<Document> {
        session.transform(yaml(source), Path::new("inline.yaml"), &TemplateArgs::new())
    }

    #[test]
    fn test_identity_without_invocations() {
        let session = Session::new();
        let source = "a: 1\nb:\n  - x\n  - {c: true, d: null}\n";
        let doc = yaml(source);
        let result = transform(&session, source).unwrap();
        assert_eq!(result, doc);
    }

    #[test]
    fn test_repeat_node_expansion() {
        let session = Session::new();
        let mut result = transform(
            &session,
            "skills: {_f: repeat_node, _a: {node: {name: X}, count: 3}}",
        )
        .unwrap();
        {
            let skills = result.as_mapping().unwrap().get("skills").unwrap();
            let elements = skills.as_sequence().unwrap();
            assert_eq!(elements.len(), 3);
            assert!(elements.iter().all(|e| e == &yaml("{name: X}")));
        }

        // The copies share no structure: mutating one element's nested data
        // leaves the others untouched.
        let elements = result
            .as_mapping_mut()
            .unwrap()
            .get_mut("skills")
            .unwrap()
            .as_sequence_mut()
            .unwrap();
        elements[0]
            .as_mapping_mut()
            .unwrap()
            .insert("name".into(), "Y".into());
        assert_eq!(elements[0], yaml("{name: Y}"));
        assert_eq!(elements[1], yaml("{name: X}"));
        assert_eq!(elements[2], yaml("{name: X}"));
    }

    #[test]
    fn test_unknown_function() {
        let session = Session::new();
        let err = transform(&session, "{_f: nonexistent, _a: 1}").unwrap_err();
        let ymx = err.downcast_ref::<YmxError>().unwrap();
        match ymx {
            YmxError::UnknownFunction { name, file } => {
                assert_eq!(name, "nonexistent");
                assert_eq!(file, "inline.yaml");
            }
            other => panic!("Expected UnknownFunction, got {other:?}"),
        }
    }

    #[test]
    fn test_arguments_resolved_before_invocation() {
        let mut session = Session::new();
        session
            .register_function("wrap", |_ctx, args| {
                Ok(Document::Sequence(vec![
                    args.required("inner")?.clone(),
                ]))
            })
            .unwrap();
        // The nested repeat_node in the arguments must already be expanded
        // when `wrap` runs.
        let result = transform(
            &session,
            "{_f: wrap, _a: {inner: {_f: repeat_node, _a: {node: 7, count: 2}}}}",
        )
        .unwrap();
        assert_eq!(result, yaml("[[7, 7]]"));
    }

    #[test]
    fn test_return_value_not_rewalked() {
        let mut session = Session::new();
        session
            .register_function("quote", |_ctx, _args| {
                Ok(serde_yaml::from_str("{_f: repeat_node, _a: {node: 1, count: 1}}").unwrap())
            })
            .unwrap();
        let result = transform(&session, "{_f: quote, _a: null}").unwrap();
        // The returned invocation node survives verbatim.
        assert!(document::invocation_parts(&result).is_some());
    }

    #[test]
    fn test_sequence_side_effect_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut session = Session::new();
        let log = Arc::clone(&order);
        session
            .register_function("record", move |_ctx, args| {
                let tag = args.required_str("tag")?.to_string();
                log.lock().unwrap().push(tag);
                Ok(Document::Null)
            })
            .unwrap();
        transform(
            &session,
            "- {_f: record, _a: {tag: a}}\n- {_f: record, _a: {tag: b}}\n- {_f: record, _a: {tag: c}}\n",
        )
        .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_function_error_wrapped_once() {
        let mut session = Session::new();
        session
            .register_function("explode", |_ctx, _args| Err(anyhow::anyhow!("boom")))
            .unwrap();
        let err = transform(&session, "{_f: explode, _a: null}").unwrap_err();
        match err.downcast_ref::<YmxError>().unwrap() {
            YmxError::Transformation { function, file, reason } => {
                assert_eq!(function, "explode");
                assert_eq!(file, "inline.yaml");
                assert!(reason.contains("boom"));
            }
            other => panic!("Expected Transformation, got {other:?}"),
        }
    }

    #[test]
    fn test_file_scoped_error_not_rewrapped() {
        let mut session = Session::new();
        session
            .register_function("inner_fail", |_ctx, _args| {
                Err(YmxError::Transformation {
                    function: "deep".to_string(),
                    file: "included.yaml".to_string(),
                    reason: "original failure".to_string(),
                }
                .into())
            })
            .unwrap();
        let err = transform(&session, "{_f: inner_fail, _a: null}").unwrap_err();
        // The inner context survives untouched; no second prefix.
        match err.downcast_ref::<YmxError>().unwrap() {
            YmxError::Transformation { function, file, .. } => {
                assert_eq!(function, "deep");
                assert_eq!(file, "included.yaml");
            }
            other => panic!("Expected inner Transformation, got {other:?}"),
        }
        assert_eq!(err.to_string().matches("Error in transformation").count(), 1);
    }

    #[test]
    fn test_invocation_shape_edge_cases() {
        let session = Session::new();
        // _f without _a, _a without _f, and extra keys are all plain data.
        for source in [
            "{_f: repeat_node}",
            "{_a: {count: 1}}",
            "{_f: repeat_node, _a: {node: 1, count: 1}, extra: true}",
        ] {
            let doc = yaml(source);
            let result = transform(&session, source).unwrap();
            assert_eq!(result, doc, "source: {source}");
        }
    }

    #[test]
    fn test_mapping_order_preserved() {
        let session = Session::new();
        let result = transform(&session, "z: 1\na: 2\nm: 3\n").unwrap();
        let keys: Vec<&str> = result
            .as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_resolve_path_relative_to_document() {
        let session = Session::new();
        let ctx = ExecContext {
            session: &session,
            file: Path::new("/data/docs/root.yaml"),
            registry: &FunctionRegistry::new(),
            template_args: &TemplateArgs::new(),
        };
        assert_eq!(ctx.resolve_path("sub/a.yaml"), PathBuf::from("/data/docs/sub/a.yaml"));
        assert_eq!(ctx.resolve_path("/abs/a.yaml"), PathBuf::from("/abs/a.yaml"));
    }
}
