//! Whole-file conversion drivers.
//!
//! Each driver runs a full expansion through a [`Session`] and serializes
//! the result in the requested target form. The drivers are the programmatic
//! equivalents of the CLI's extension-based dispatch and are usable on their
//! own by host applications.

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::codec::SchemaCodec;
use crate::core::YmxError;
use crate::document::{self, Document, Metadata};
use crate::engine::Session;
use crate::template::TemplateArgs;

/// Expands a YAML document and writes the expanded YAML to `output`.
///
/// The `_meta` section removed during expansion is re-attached as the first
/// key, so the output remains a self-describing document.
///
/// # Errors
///
/// Any load or expansion failure, or an I/O failure writing `output`.
pub fn yaml_to_yaml(
    session: &Session,
    input: &Path,
    output: &Path,
    template_args: &TemplateArgs,
) -> anyhow::Result<()> {
    debug!(input = %input.display(), output = %output.display(), "converting yaml to yaml");
    let (doc, metadata) = session.load_document(input, template_args, None)?;
    let doc = match metadata {
        Some(metadata) => document::attach_metadata(&metadata, doc),
        None => doc,
    };
    let text = serde_yaml::to_string(&doc)
        .with_context(|| format!("failed to serialize '{}'", output.display()))?;
    write_output(output, text.as_bytes())
}

/// Expands a YAML document and writes it as pretty-printed JSON.
///
/// `_meta` drives the expansion but does not belong in the structural
/// output, so it is returned to the caller instead of being embedded.
///
/// # Errors
///
/// Any load or expansion failure, or an I/O failure writing `output`.
pub fn yaml_to_json(
    session: &Session,
    input: &Path,
    output: &Path,
    template_args: &TemplateArgs,
) -> anyhow::Result<Option<Metadata>> {
    debug!(input = %input.display(), output = %output.display(), "converting yaml to json");
    let (doc, metadata) = session.load_document(input, template_args, None)?;
    let json: serde_json::Value = serde_yaml::from_value(doc)
        .with_context(|| format!("document '{}' is not representable as JSON", input.display()))?;
    let mut text = serde_json::to_string_pretty(&json)
        .with_context(|| format!("failed to serialize '{}'", output.display()))?;
    text.push('\n');
    write_output(output, text.as_bytes())?;
    Ok(metadata)
}

/// Expands a YAML document and encodes it to binary through the codec.
///
/// # Errors
///
/// [`YmxError::MissingSchemaIdentity`] when the document has no `_meta`
/// schema identity, [`YmxError::Codec`] when no codec is configured or
/// encoding fails, plus any load or expansion failure.
pub fn yaml_to_bin(
    session: &Session,
    input: &Path,
    output: &Path,
    template_args: &TemplateArgs,
) -> anyhow::Result<()> {
    debug!(input = %input.display(), output = %output.display(), "converting yaml to binary");
    let (doc, metadata) = session.load_document(input, template_args, None)?;
    let metadata = metadata.ok_or_else(|| YmxError::MissingSchemaIdentity {
        file: input.display().to_string(),
    })?;
    let identity = metadata.schema_identity(input)?;

    let codec = require_codec(session, input)?;
    let encoded = codec
        .encode(&identity, metadata.initialization_args(), &doc)
        .map_err(|e| YmxError::Codec {
            file: input.display().to_string(),
            reason: format!("{e:#}"),
        })?;
    write_output(output, &encoded.buffer)
}

/// Decodes a binary file into the YAML document at `output`.
///
/// The schema identity and initialization arguments come from the *target*
/// document: `output` must already exist and carry a `_meta` section naming
/// the schema. The decoded tree replaces the document body; `_meta` is
/// re-attached as the first key.
///
/// # Errors
///
/// [`YmxError::MissingSchemaIdentity`] when the target has no `_meta`,
/// [`YmxError::Codec`] on codec failures, plus read/parse/write failures.
pub fn bin_to_yaml(session: &Session, input: &Path, output: &Path) -> anyhow::Result<()> {
    debug!(input = %input.display(), output = %output.display(), "converting binary to yaml");
    let target = fs::read_to_string(output).map_err(|e| YmxError::DocumentRead {
        file: output.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut target = document::parse_document(&target, output)?;
    let metadata = document::extract_metadata(&mut target, output)?.ok_or_else(|| {
        YmxError::MissingSchemaIdentity {
            file: output.display().to_string(),
        }
    })?;
    let identity = metadata.schema_identity(output)?;

    let bytes = fs::read(input).map_err(|e| YmxError::DocumentRead {
        file: input.display().to_string(),
        reason: e.to_string(),
    })?;
    let codec = require_codec(session, input)?;
    let decoded: Document = codec
        .decode(&identity, metadata.initialization_args(), &bytes)
        .map_err(|e| YmxError::Codec {
            file: input.display().to_string(),
            reason: format!("{e:#}"),
        })?;

    let doc = document::attach_metadata(&metadata, decoded);
    let text = serde_yaml::to_string(&doc)
        .with_context(|| format!("failed to serialize '{}'", output.display()))?;
    write_output(output, text.as_bytes())
}

fn require_codec<'a>(session: &'a Session, file: &Path) -> anyhow::Result<&'a dyn SchemaCodec> {
    session
        .codec()
        .map(|codec| codec.as_ref())
        .ok_or_else(|| {
            YmxError::Codec {
                file: file.display().to_string(),
                reason: "no schema codec configured on the session".to_string(),
            }
            .into()
        })
}

fn write_output(output: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
        }
    }
    fs::write(output, bytes).with_context(|| format!("failed to write '{}'", output.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::codec::{CompressionKind, EncodedExtern, SchemaIdentity};

    /// Codec that serializes documents as JSON bytes, enough to observe the
    /// driver plumbing without a real schema toolchain.
    struct JsonCodec;

    impl SchemaCodec for JsonCodec {
        fn encode(
            &self,
            _identity: &SchemaIdentity,
            _init_args: &[Document],
            document: &Document,
        ) -> anyhow::Result<EncodedExtern> {
            let json: serde_json::Value = serde_yaml::from_value(document.clone())?;
            let buffer = serde_json::to_vec(&json)?;
            let bit_size = buffer.len() as u64 * 8;
            Ok(EncodedExtern { buffer, bit_size })
        }

        fn decode(
            &self,
            _identity: &SchemaIdentity,
            _init_args: &[Document],
            data: &[u8],
        ) -> anyhow::Result<Document> {
            let json: serde_json::Value = serde_json::from_slice(data)?;
            Ok(serde_yaml::to_value(&json)?)
        }

        fn decompress(&self, _kind: CompressionKind, data: &[u8]) -> anyhow::Result<Vec<u8>> {
            Ok(data.to_vec())
        }
    }

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_yaml_to_yaml_reattaches_meta_first() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(
            dir.path(),
            "in.yaml",
            "_meta:\n  schema_module: demo\n  schema_type: Root\nvalue: 1\n",
        );
        let output = dir.path().join("out.yaml");

        let session = Session::new();
        yaml_to_yaml(&session, &input, &output, &TemplateArgs::new()).unwrap();

        let text = fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("_meta:"));
        let doc: Document = serde_yaml::from_str(&text).unwrap();
        assert_eq!(
            doc.as_mapping().unwrap().get("value").unwrap().as_u64(),
            Some(1)
        );
    }

    #[test]
    fn test_yaml_to_json_returns_metadata_and_omits_meta() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(
            dir.path(),
            "in.yaml",
            "_meta:\n  schema_module: demo\n  schema_type: Root\nvalue: [1, 2]\n",
        );
        let output = dir.path().join("out.json");

        let session = Session::new();
        let metadata = yaml_to_json(&session, &input, &output, &TemplateArgs::new())
            .unwrap()
            .unwrap();
        assert_eq!(metadata.schema_module.as_deref(), Some("demo"));

        let text = fs::read_to_string(&output).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(json.get("_meta").is_none());
        assert_eq!(json["value"][1], 2);
    }

    #[test]
    fn test_yaml_to_bin_and_back() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(
            dir.path(),
            "in.yaml",
            "_meta:\n  schema_module: demo\n  schema_type: Root\nvalue: 7\n",
        );
        let bin = dir.path().join("out.bin");

        let session = Session::new().with_codec(Arc::new(JsonCodec));
        yaml_to_bin(&session, &input, &bin, &TemplateArgs::new()).unwrap();
        assert!(fs::read(&bin).unwrap().starts_with(b"{"));

        // Round trip: the target document supplies the schema identity.
        let target = write(
            dir.path(),
            "roundtrip.yaml",
            "_meta:\n  schema_module: demo\n  schema_type: Root\n",
        );
        bin_to_yaml(&session, &bin, &target).unwrap();
        let text = fs::read_to_string(&target).unwrap();
        assert!(text.starts_with("_meta:"));
        let doc: Document = serde_yaml::from_str(&text).unwrap();
        assert_eq!(
            doc.as_mapping().unwrap().get("value").unwrap().as_u64(),
            Some(7)
        );
    }

    #[test]
    fn test_yaml_to_bin_requires_identity_and_codec() {
        let dir = tempfile::tempdir().unwrap();
        let no_meta = write(dir.path(), "plain.yaml", "value: 1\n");
        let bin = dir.path().join("out.bin");

        let with_codec = Session::new().with_codec(Arc::new(JsonCodec));
        let err = yaml_to_bin(&with_codec, &no_meta, &bin, &TemplateArgs::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<YmxError>(),
            Some(YmxError::MissingSchemaIdentity { .. })
        ));

        let with_meta = write(
            dir.path(),
            "typed.yaml",
            "_meta:\n  schema_module: demo\n  schema_type: Root\nvalue: 1\n",
        );
        let without_codec = Session::new();
        let err = yaml_to_bin(&without_codec, &with_meta, &bin, &TemplateArgs::new()).unwrap_err();
        match err.downcast_ref::<YmxError>() {
            Some(YmxError::Codec { reason, .. }) => {
                assert!(reason.contains("no schema codec"));
            }
            other => panic!("Expected Codec error, got {other:?}"),
        }
    }

    #[test]
    fn test_bin_to_yaml_requires_target_meta() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write(dir.path(), "in.bin", "{}");
        let target = write(dir.path(), "target.yaml", "value: 1\n");

        let session = Session::new().with_codec(Arc::new(JsonCodec));
        let err = bin_to_yaml(&session, &bin, &target).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<YmxError>(),
            Some(YmxError::MissingSchemaIdentity { .. })
        ));
    }
}
