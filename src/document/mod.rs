//! Document model: YAML trees, invocation-node detection, and metadata.
//!
//! A document is a tree of scalars, sequences, and mappings represented as
//! [`serde_yaml::Value`]; mapping keys are unique and insertion order is
//! preserved, so a transformed tree re-serializes stably.
//!
//! Two node shapes are reserved:
//! - an **invocation node** is a mapping with exactly the two keys `_f`
//!   (function name, string) and `_a` (arguments); it is expanded in place by
//!   the engine. Any other mapping is plain data, even when it happens to
//!   contain one of the two keys.
//! - the root-level **`_meta` mapping** carries schema identity and plugin
//!   references; it is split off before transformation and never walked.

pub mod path;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::SchemaIdentity;
use crate::core::YmxError;

/// A document tree: scalar, sequence, or order-preserving mapping.
pub type Document = serde_yaml::Value;

/// An order-preserving mapping of document nodes.
pub type Mapping = serde_yaml::Mapping;

/// Reserved key naming the function of an invocation node.
pub const FUNCTION_KEY: &str = "_f";
/// Reserved key holding the arguments of an invocation node.
pub const ARGUMENTS_KEY: &str = "_a";
/// Reserved root-level key holding document metadata.
pub const META_KEY: &str = "_meta";

/// Splits an invocation node into `(function name, arguments)`.
///
/// Returns `None` for every other node, including mappings that carry `_f`
/// and `_a` alongside additional keys.
#[must_use]
pub fn invocation_parts(value: &Document) -> Option<(&str, &Document)> {
    let mapping = value.as_mapping()?;
    if mapping.len() != 2 {
        return None;
    }
    let name = mapping.get(FUNCTION_KEY)?.as_str()?;
    let args = mapping.get(ARGUMENTS_KEY)?;
    Some((name, args))
}

/// Builds a merge-include invocation node referencing `file`.
///
/// Used by transformations that materialize a document on disk and splice a
/// deferred reference to it into the output tree.
#[must_use]
pub fn insert_yaml_invocation(file: &str) -> Document {
    let mut args = Mapping::new();
    args.insert("file".into(), file.into());
    let mut node = Mapping::new();
    node.insert(FUNCTION_KEY.into(), "insert_yaml".into());
    node.insert(ARGUMENTS_KEY.into(), Document::Mapping(args));
    Document::Mapping(node)
}

/// Parses YAML source text into a document tree.
///
/// # Errors
///
/// Returns [`YmxError::DocumentParse`] naming `file` and, when the parser
/// reports one, the offending line and column.
pub fn parse_document(source: &str, file: &Path) -> Result<Document, YmxError> {
    serde_yaml::from_str(source).map_err(|e| {
        let mut reason = e.to_string();
        if let Some(location) = e.location() {
            if !reason.contains("line") {
                reason.push_str(&format!(
                    " at line {}, column {}",
                    location.line(),
                    location.column()
                ));
            }
        }
        YmxError::DocumentParse {
            file: file.display().to_string(),
            reason,
        }
    })
}

/// The reserved `_meta` section of a root document.
///
/// Extracted once at load time and returned to the caller separately from the
/// transformed tree; conversion drivers re-attach it (first) on output. Keys
/// beyond the known ones are preserved verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Codec schema namespace identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_module: Option<String>,
    /// Codec schema type identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Positional arguments forwarded to codec deserialization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialization_args: Option<Vec<Document>>,
    /// Name of a registered function set to load before transformation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformation_module: Option<String>,
    /// Any additional metadata keys, preserved for re-serialization.
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Metadata {
    /// The schema identity required for codec operations.
    ///
    /// # Errors
    ///
    /// Returns [`YmxError::MissingSchemaIdentity`] naming `file` when either
    /// `schema_module` or `schema_type` is absent.
    pub fn schema_identity(&self, file: &Path) -> Result<SchemaIdentity, YmxError> {
        match (&self.schema_module, &self.schema_type) {
            (Some(module), Some(type_name)) => Ok(SchemaIdentity {
                module: module.clone(),
                type_name: type_name.clone(),
            }),
            _ => Err(YmxError::MissingSchemaIdentity {
                file: file.display().to_string(),
            }),
        }
    }

    /// Positional codec initialization arguments, empty when unspecified.
    #[must_use]
    pub fn initialization_args(&self) -> &[Document] {
        self.initialization_args.as_deref().unwrap_or(&[])
    }

    /// Renders the metadata back into a `_meta` mapping value.
    #[must_use]
    pub fn to_value(&self) -> Document {
        serde_yaml::to_value(self).unwrap_or(Document::Mapping(Mapping::new()))
    }
}

/// Removes the `_meta` section from a root document, if present.
///
/// Non-mapping roots and mappings without `_meta` yield `None`; the document
/// is left untouched in that case.
///
/// # Errors
///
/// Returns [`YmxError::DocumentParse`] when the `_meta` section exists but
/// does not have the expected shape (for example, `initialization_args` that
/// is not a sequence).
pub fn extract_metadata(
    root: &mut Document,
    file: &Path,
) -> Result<Option<Metadata>, YmxError> {
    let Some(mapping) = root.as_mapping_mut() else {
        return Ok(None);
    };
    let Some(raw) = mapping.remove(META_KEY) else {
        return Ok(None);
    };
    serde_yaml::from_value(raw)
        .map(Some)
        .map_err(|e| YmxError::DocumentParse {
            file: file.display().to_string(),
            reason: format!("invalid _meta section: {e}"),
        })
}

/// Re-attaches metadata to a transformed tree with `_meta` as the first key.
///
/// Non-mapping roots are returned unchanged; there is nowhere to splice the
/// section into a sequence or scalar.
#[must_use]
pub fn attach_metadata(metadata: &Metadata, document: Document) -> Document {
    let Document::Mapping(body) = document else {
        return document;
    };
    let mut combined = Mapping::new();
    combined.insert(META_KEY.into(), metadata.to_value());
    for (key, value) in body {
        combined.insert(key, value);
    }
    Document::Mapping(combined)
}
