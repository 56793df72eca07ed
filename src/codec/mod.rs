//! Interface to the external binary schema codec.
//!
//! The engine never encodes or decodes binary data itself; it hands fully
//! resolved trees, together with a schema identity taken from document
//! metadata, to a host-provided [`SchemaCodec`]. Compression is part of the
//! same collaborator surface: the engine names a [`CompressionKind`] and
//! passes opaque bytes through.
//!
//! Codec failures are opaque to the engine; they surface as
//! [`YmxError::Codec`](crate::core::YmxError::Codec) with the current
//! document path attached.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{Document, Mapping};

/// Identity of a codec schema type: namespace plus type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIdentity {
    /// Schema namespace (the `schema_module` metadata field).
    pub module: String,
    /// Schema type (the `schema_type` metadata field).
    pub type_name: String,
}

impl std::fmt::Display for SchemaIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.type_name)
    }
}

/// An encoded document: byte buffer plus its exact length in bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedExtern {
    /// The encoded bytes.
    pub buffer: Vec<u8>,
    /// Number of significant bits in `buffer`.
    pub bit_size: u64,
}

impl EncodedExtern {
    /// Renders the extern as its `{buffer, bitSize}` node shape.
    #[must_use]
    pub fn to_value(&self) -> Document {
        let mut mapping = Mapping::new();
        mapping.insert(
            "buffer".into(),
            Document::Sequence(self.buffer.iter().map(|b| Document::from(*b as u64)).collect()),
        );
        mapping.insert("bitSize".into(), Document::from(self.bit_size));
        Document::Mapping(mapping)
    }

    /// Reads an extern back from its `{buffer, bitSize}` node shape.
    ///
    /// # Errors
    ///
    /// Fails when the node is not a mapping with a byte sequence `buffer`
    /// and an integer `bitSize`.
    pub fn from_value(value: &Document) -> anyhow::Result<Self> {
        let mapping = value
            .as_mapping()
            .ok_or_else(|| anyhow::anyhow!("extern node must be a mapping"))?;
        let buffer = mapping
            .get("buffer")
            .and_then(Document::as_sequence)
            .ok_or_else(|| anyhow::anyhow!("extern node must have a 'buffer' sequence"))?
            .iter()
            .map(|v| {
                v.as_u64()
                    .filter(|b| *b <= u64::from(u8::MAX))
                    .map(|b| b as u8)
                    .ok_or_else(|| anyhow::anyhow!("'buffer' must contain byte values (0-255)"))
            })
            .collect::<anyhow::Result<Vec<u8>>>()?;
        let bit_size = mapping
            .get("bitSize")
            .and_then(Document::as_u64)
            .ok_or_else(|| anyhow::anyhow!("extern node must have an integer 'bitSize'"))?;
        Ok(Self { buffer, bit_size })
    }
}

/// Compression applied to an extern buffer before it reaches the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// DEFLATE with zlib framing.
    Zlib,
    /// DEFLATE with gzip framing.
    Gzip,
    /// Zstandard.
    Zstd,
}

impl FromStr for CompressionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zlib" => Ok(Self::Zlib),
            "gzip" => Ok(Self::Gzip),
            "zstd" => Ok(Self::Zstd),
            other => Err(format!(
                "unknown compression kind '{other}' (expected zlib, gzip, or zstd)"
            )),
        }
    }
}

impl std::fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Zlib => "zlib",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        })
    }
}

/// The external codec collaborator.
///
/// Implementations bind a real schema toolchain; the stock binary ships
/// without one and fails binary conversions with a clear error. All methods
/// are synchronous; failures are returned as opaque errors and wrapped with
/// file context by the engine.
pub trait SchemaCodec: Send + Sync {
    /// Encodes a resolved document against a schema type.
    ///
    /// # Errors
    ///
    /// Any codec-specific failure; passed through opaquely.
    fn encode(
        &self,
        identity: &SchemaIdentity,
        init_args: &[Document],
        document: &Document,
    ) -> anyhow::Result<EncodedExtern>;

    /// Decodes binary data against a schema type into a document tree.
    ///
    /// # Errors
    ///
    /// Any codec-specific failure; passed through opaquely.
    fn decode(
        &self,
        identity: &SchemaIdentity,
        init_args: &[Document],
        data: &[u8],
    ) -> anyhow::Result<Document>;

    /// Decompresses a buffer of the given kind.
    ///
    /// # Errors
    ///
    /// Any failure of the underlying compression library; passed through
    /// opaquely.
    fn decompress(&self, kind: CompressionKind, data: &[u8]) -> anyhow::Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extern_node_round_trip() {
        let encoded = EncodedExtern {
            buffer: vec![0x01, 0xFF, 0x10],
            bit_size: 22,
        };
        let node = encoded.to_value();
        let mapping = node.as_mapping().unwrap();
        assert_eq!(mapping.get("bitSize").unwrap().as_u64(), Some(22));
        assert_eq!(mapping.get("buffer").unwrap().as_sequence().unwrap().len(), 3);

        let back = EncodedExtern::from_value(&node).unwrap();
        assert_eq!(back, encoded);
    }

    #[test]
    fn test_extern_from_value_rejects_bad_shapes() {
        let not_mapping: Document = serde_yaml::from_str("[1, 2]").unwrap();
        assert!(EncodedExtern::from_value(&not_mapping).is_err());

        let bad_byte: Document = serde_yaml::from_str("{buffer: [300], bitSize: 8}").unwrap();
        assert!(EncodedExtern::from_value(&bad_byte).is_err());

        let missing_bits: Document = serde_yaml::from_str("{buffer: [1]}").unwrap();
        assert!(EncodedExtern::from_value(&missing_bits).is_err());
    }

    #[test]
    fn test_compression_kind_parsing() {
        assert_eq!("zlib".parse::<CompressionKind>().unwrap(), CompressionKind::Zlib);
        assert_eq!("zstd".parse::<CompressionKind>().unwrap(), CompressionKind::Zstd);
        assert!("lzma".parse::<CompressionKind>().is_err());
        assert_eq!(CompressionKind::Gzip.to_string(), "gzip");
    }
}
