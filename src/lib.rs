//! YMX - YAML macro expansion engine
//!
//! A recursive interpreter over YAML documents: mappings of the shape
//! `{_f: <function>, _a: <arguments>}` are treated as invocation nodes and
//! replaced, depth-first, by the result of the named transformation
//! function. Everything else passes through structurally unchanged, with
//! mapping key order preserved.
//!
//! # Architecture Overview
//!
//! Expansion is driven by a [`engine::Session`], which owns every piece of
//! run state:
//! - a root [`registry::FunctionRegistry`] seeded with the built-ins,
//! - host-registered plugin sets selected per document via
//!   `_meta.transformation_module`,
//! - a [`cache::DocumentCache`] memoizing transformed documents per
//!   `(canonical path, template arguments)`,
//! - an optional [`codec::SchemaCodec`] for binary encode/decode.
//!
//! There is no global state; independent sessions never interact.
//!
//! ## Document pipeline
//!
//! 1. Read the file and substitute `${name}` template placeholders.
//! 2. Parse YAML and pop the `_meta` section (schema identity, plugin
//!    selection, initialization arguments).
//! 3. Walk the tree depth-first, expanding invocation nodes; arguments are
//!    expanded before the invocation itself, return values are spliced in
//!    verbatim.
//! 4. Cache the result; later includes of the same file with the same
//!    template arguments get an independent deep copy.
//!
//! # Core Modules
//!
//! - [`engine`] - the session and the recursive interpreter
//! - [`registry`] - function registry, plugin sets, argument access
//! - [`functions`] - built-in transformations (`repeat_node`, `insert_yaml`,
//!   `insert_yaml_as_extern`, `extract_extern_as_yaml`, `eval`)
//! - [`document`] - document type, invocation shape, `_meta` handling, path
//!   addressing
//! - [`template`] - `${name}` substitution of template arguments
//! - [`cache`] - memoization of transformed documents
//! - [`codec`] - the external binary schema codec interface
//! - [`convert`] - whole-file conversion drivers (YAML/JSON/binary)
//! - [`cli`] - the `ymx` command-line interface
//! - [`core`] - error types and user-facing error rendering
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use ymx::engine::Session;
//! use ymx::template::TemplateArgs;
//!
//! let mut session = Session::new();
//! session.register_function("shout", |_ctx, args| {
//!     let text = args.required_str("text")?;
//!     Ok(text.to_uppercase().into())
//! })?;
//!
//! let (doc, meta) = session.load_document(
//!     "scene.yaml".as_ref(),
//!     &TemplateArgs::new(),
//!     None,
//! )?;
//! ```

pub mod cache;
pub mod cli;
pub mod codec;
pub mod convert;
pub mod core;
pub mod document;
pub mod engine;
pub mod functions;
pub mod registry;
pub mod template;
