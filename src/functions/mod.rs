//! Built-in transformation functions.
//!
//! Every session is seeded with this set: node repetition, the two external
//! inclusion patterns (merge-include and extern-include), extern extraction
//! back to a document file, and an optional restricted expression evaluator.
//! All built-ins use the uniform registry signature and go through the same
//! error-wrapping path as host-supplied functions.

pub mod eval;

use std::fs;

use anyhow::Context;

use crate::codec::{CompressionKind, EncodedExtern, SchemaCodec, SchemaIdentity};
use crate::core::YmxError;
use crate::document::{self, Document, Mapping, Metadata, path};
use crate::engine::ExecContext;
use crate::registry::{Arguments, FunctionSet, TransformResult};

/// The built-in function set.
///
/// `include_eval` controls whether the expression evaluator is part of the
/// set; sessions created with
/// [`Session::without_expression_eval`](crate::engine::Session::without_expression_eval)
/// omit it.
#[must_use]
pub fn builtins(include_eval: bool) -> FunctionSet {
    let mut set = FunctionSet::new()
        .function("repeat_node", repeat_node)
        .function("insert_yaml", insert_yaml)
        .function("insert_yaml_as_extern", insert_yaml_as_extern)
        .function("extract_extern_as_yaml", extract_extern_as_yaml);
    if include_eval {
        set = set.function("eval", eval_expression);
    }
    set
}

/// `repeat_node {node, count}`: a sequence of `count` independent deep
/// copies of `node`.
fn repeat_node(_ctx: &ExecContext<'_>, args: Arguments) -> TransformResult {
    let node = args.required("node")?;
    let count = args.required_u64("count")?;
    let count = usize::try_from(count).context("argument 'count' is too large")?;
    Ok(Document::Sequence(vec![node.clone(); count]))
}

/// `insert_yaml {file, node_path?, template_args?}`: merge-include.
///
/// Loads (or fetches the cached) fully transformed external document and
/// splices a deep copy of it, or of the sub-node selected by `node_path`,
/// into the calling tree. The sub-path is re-derived on every access; only
/// the whole-document transformation is memoized.
fn insert_yaml(ctx: &ExecContext<'_>, args: Arguments) -> TransformResult {
    let file = args.required_str("file")?;
    let node_path = args.optional_str("node_path")?;
    let template_args = args.template_args("template_args")?;

    let (doc, _metadata) = ctx.load_relative(file, &template_args)?;
    match node_path {
        None | Some("") => Ok(doc),
        Some(node_path) => {
            let included = ctx.resolve_path(file);
            let selected = path::select(&doc, node_path, &included)?;
            Ok(selected.clone())
        }
    }
}

/// `insert_yaml_as_extern {file, template_args?}`: extern-include.
///
/// Loads and transforms the external document, encodes it through the codec
/// using the schema identity from its metadata, and splices the resulting
/// `{buffer, bitSize}` node into the calling tree.
fn insert_yaml_as_extern(ctx: &ExecContext<'_>, args: Arguments) -> TransformResult {
    let file = args.required_str("file")?;
    let template_args = args.template_args("template_args")?;
    let included = ctx.resolve_path(file);

    let (doc, metadata) = ctx.load_relative(file, &template_args)?;
    let metadata = metadata.ok_or_else(|| YmxError::MissingSchemaIdentity {
        file: included.display().to_string(),
    })?;
    let identity = metadata.schema_identity(&included)?;

    let codec = require_codec(ctx)?;
    let encoded = codec
        .encode(&identity, metadata.initialization_args(), &doc)
        .map_err(|e| YmxError::Codec {
            file: included.display().to_string(),
            reason: format!("{e:#}"),
        })?;
    Ok(encoded.to_value())
}

/// `extract_extern_as_yaml {buffer, bitSize, schema_module, schema_type,
/// file, compression?, strip_nulls?}`.
///
/// Decodes an extern buffer back into a document, writes it as a new YAML
/// file next to the current document, and returns a merge-include
/// invocation node referencing it, so re-expanding the output pulls the
/// extracted file back in.
fn extract_extern_as_yaml(ctx: &ExecContext<'_>, args: Arguments) -> TransformResult {
    let mut extern_node = Mapping::new();
    extern_node.insert("buffer".into(), args.required("buffer")?.clone());
    extern_node.insert("bitSize".into(), args.required("bitSize")?.clone());
    let encoded = EncodedExtern::from_value(&Document::Mapping(extern_node))?;

    let identity = SchemaIdentity {
        module: args.required_str("schema_module")?.to_string(),
        type_name: args.required_str("schema_type")?.to_string(),
    };
    let destination = args.required_str("file")?;
    let destination_path = ctx.resolve_path(destination);
    let codec = require_codec(ctx)?;

    let bytes = match args.optional_str("compression")? {
        Some(kind) => {
            let kind: CompressionKind =
                kind.parse().map_err(|reason: String| anyhow::anyhow!(reason))?;
            codec
                .decompress(kind, &encoded.buffer)
                .map_err(|e| YmxError::Codec {
                    file: destination_path.display().to_string(),
                    reason: format!("{e:#}"),
                })?
        }
        None => encoded.buffer,
    };

    let mut decoded =
        codec
            .decode(&identity, &[], &bytes)
            .map_err(|e| YmxError::Codec {
                file: destination_path.display().to_string(),
                reason: format!("{e:#}"),
            })?;
    if args.optional_bool("strip_nulls")? {
        strip_nulls(&mut decoded);
    }

    let metadata = Metadata {
        schema_module: Some(identity.module.clone()),
        schema_type: Some(identity.type_name.clone()),
        ..Metadata::default()
    };
    let output = document::attach_metadata(&metadata, decoded);
    let text = serde_yaml::to_string(&output)
        .with_context(|| format!("failed to serialize '{}'", destination_path.display()))?;
    if let Some(parent) = destination_path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create directory '{}'", parent.display())
        })?;
    }
    fs::write(&destination_path, text)
        .with_context(|| format!("failed to write '{}'", destination_path.display()))?;

    Ok(document::insert_yaml_invocation(destination))
}

/// `eval <expression>`: restricted expression evaluation.
///
/// Accepts the expression as a single positional string or as a named
/// `expression` argument. The grammar is a closed set of safe primitives;
/// see [`eval`].
fn eval_expression(_ctx: &ExecContext<'_>, args: Arguments) -> TransformResult {
    let expression = match &args {
        Arguments::Positional(Document::String(s)) => s.as_str(),
        Arguments::Positional(_) => {
            anyhow::bail!("eval expects a string expression")
        }
        Arguments::Named(_) => args.required_str("expression")?,
    };
    eval::evaluate(expression)
}

fn require_codec<'a>(ctx: &'a ExecContext<'_>) -> anyhow::Result<&'a dyn SchemaCodec> {
    ctx.session()
        .codec()
        .map(|codec| codec.as_ref())
        .ok_or_else(|| YmxError::Codec {
            file: ctx.file().display().to_string(),
            reason: "no schema codec configured on the session".to_string(),
        }
        .into())
}

/// Recursively removes null-valued mapping entries.
fn strip_nulls(value: &mut Document) {
    match value {
        Document::Mapping(mapping) => {
            let kept: Mapping = std::mem::take(mapping)
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, mut v)| {
                    strip_nulls(&mut v);
                    (k, v)
                })
                .collect();
            *mapping = kept;
        }
        Document::Sequence(items) => {
            for item in items {
                strip_nulls(item);
            }
        }
        _ => {}
    }
}
