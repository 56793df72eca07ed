//! Path addresses for selecting sub-nodes of a document.
//!
//! A path string addresses a node inside a document tree using `.` to
//! descend into mappings and `[n]` to index sequences:
//!
//! ```text
//! members[0].name
//! teams[2].members[0]
//! ```
//!
//! The empty string addresses the whole document. Every failure, whether in
//! parsing or traversal, surfaces as [`YmxError::InvalidPath`] naming the
//! path string and the source file it was resolved against; callers never
//! see a raw missing-key or out-of-range error.

use std::fmt;
use std::path::Path;

use crate::core::YmxError;
use crate::document::Document;

/// One step of a path address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// Descend into a mapping by key.
    Key(String),
    /// Index into a sequence.
    Index(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// An ordered sequence of steps addressing a node inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathAddress {
    steps: Vec<PathStep>,
}

impl PathAddress {
    /// Parses a path string into an address.
    ///
    /// An empty string yields an empty address addressing the whole
    /// document.
    ///
    /// # Errors
    ///
    /// Returns [`YmxError::InvalidPath`] for malformed input: an
    /// unterminated `[`, a non-integer index, a stray `]`, or an empty key
    /// segment.
    pub fn parse(path: &str, file: &Path) -> Result<Self, YmxError> {
        let invalid = |reason: String| YmxError::InvalidPath {
            path: path.to_string(),
            file: file.display().to_string(),
            reason,
        };

        let mut steps = Vec::new();
        let mut key = String::new();
        let mut chars = path.chars().peekable();

        // A bare key is terminated by '.' or '['; '[...]' encloses an
        // integer index and may be followed by '.', another '[', or the end.
        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() {
                        return Err(invalid("empty key segment".to_string()));
                    }
                    steps.push(PathStep::Key(std::mem::take(&mut key)));
                }
                '[' => {
                    if !key.is_empty() {
                        steps.push(PathStep::Key(std::mem::take(&mut key)));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) => digits.push(d),
                            None => return Err(invalid("unterminated '[' index".to_string())),
                        }
                    }
                    let index: usize = digits.parse().map_err(|_| {
                        invalid(format!("'{digits}' is not a non-negative integer index"))
                    })?;
                    steps.push(PathStep::Index(index));
                    // After ']' only '.', another '[', or the end may follow.
                    match chars.peek() {
                        Some('.') => {
                            chars.next();
                            if chars.peek().is_none() {
                                return Err(invalid("trailing '.'".to_string()));
                            }
                        }
                        Some('[') | None => {}
                        Some(other) => {
                            return Err(invalid(format!("unexpected '{other}' after ']'")));
                        }
                    }
                }
                ']' => return Err(invalid("unexpected ']'".to_string())),
                _ => key.push(c),
            }
        }
        if !key.is_empty() {
            steps.push(PathStep::Key(key));
        } else if path.ends_with('.') {
            return Err(invalid("trailing '.'".to_string()));
        }

        Ok(Self { steps })
    }

    /// Whether this address selects the whole document.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// The parsed steps, in order.
    #[must_use]
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Walks the address against a document and returns the selected node.
    ///
    /// # Errors
    ///
    /// Returns [`YmxError::InvalidPath`] when a key step meets a non-mapping
    /// or an absent key, or an index step meets a non-sequence or an
    /// out-of-range index. The error names the original path string and
    /// `file`.
    pub fn resolve<'a>(
        &self,
        document: &'a Document,
        path: &str,
        file: &Path,
    ) -> Result<&'a Document, YmxError> {
        let mut current = document;
        for step in &self.steps {
            current = match step {
                PathStep::Key(key) => match current.as_mapping() {
                    Some(mapping) => mapping.get(key.as_str()).ok_or_else(|| {
                        YmxError::InvalidPath {
                            path: path.to_string(),
                            file: file.display().to_string(),
                            reason: format!("key '{key}' not found"),
                        }
                    })?,
                    None => {
                        return Err(YmxError::InvalidPath {
                            path: path.to_string(),
                            file: file.display().to_string(),
                            reason: format!("cannot descend into non-mapping node with key '{key}'"),
                        });
                    }
                },
                PathStep::Index(index) => match current.as_sequence() {
                    Some(sequence) => sequence.get(*index).ok_or_else(|| {
                        YmxError::InvalidPath {
                            path: path.to_string(),
                            file: file.display().to_string(),
                            reason: format!(
                                "index {index} out of range (sequence has {} elements)",
                                sequence.len()
                            ),
                        }
                    })?,
                    None => {
                        return Err(YmxError::InvalidPath {
                            path: path.to_string(),
                            file: file.display().to_string(),
                            reason: format!("cannot index non-sequence node with [{index}]"),
                        });
                    }
                },
            };
        }
        Ok(current)
    }
}

/// Parses and resolves a path string in one call.
///
/// # Errors
///
/// Returns [`YmxError::InvalidPath`]; see [`PathAddress::parse`] and
/// [`PathAddress::resolve`].
pub fn select<'a>(
    document: &'a Document,
    path: &str,
    file: &Path,
) -> Result<&'a Document, YmxError> {
    PathAddress::parse(path, file)?.resolve(document, path, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn yaml(source: &str) -> Document {
        serde_yaml::from_str(source).unwrap()
    }

    fn file() -> PathBuf {
        PathBuf::from("team.yaml")
    }

    #[test]
    fn test_parse_steps() {
        let address = PathAddress::parse("members[0].name", &file()).unwrap();
        assert_eq!(
            address.steps(),
            &[
                PathStep::Key("members".to_string()),
                PathStep::Index(0),
                PathStep::Key("name".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_adjacent_indexes() {
        let address = PathAddress::parse("grid[1][2]", &file()).unwrap();
        assert_eq!(
            address.steps(),
            &[
                PathStep::Key("grid".to_string()),
                PathStep::Index(1),
                PathStep::Index(2),
            ]
        );
    }

    #[test]
    fn test_parse_empty_is_root() {
        let address = PathAddress::parse("", &file()).unwrap();
        assert!(address.is_root());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["members[", "members[x]", "members]", "a..b", "a."] {
            let err = PathAddress::parse(bad, &file()).unwrap_err();
            match err {
                YmxError::InvalidPath { path, file, .. } => {
                    assert_eq!(path, bad);
                    assert_eq!(file, "team.yaml");
                }
                other => panic!("Expected InvalidPath for '{bad}', got {other:?}"),
            }
        }
    }

    #[test]
    fn test_resolve_nested() {
        let doc = yaml("members:\n  - name: Alice\n  - name: Bob\n");
        let value = select(&doc, "members[0].name", &file()).unwrap();
        assert_eq!(value.as_str(), Some("Alice"));
        let value = select(&doc, "members[1]", &file()).unwrap();
        assert_eq!(value.as_mapping().unwrap().get("name").unwrap().as_str(), Some("Bob"));
    }

    #[test]
    fn test_resolve_leading_index() {
        let doc = yaml("- first\n- second\n");
        let value = select(&doc, "[1]", &file()).unwrap();
        assert_eq!(value.as_str(), Some("second"));
    }

    #[test]
    fn test_resolve_root() {
        let doc = yaml("{a: 1}");
        let value = select(&doc, "", &file()).unwrap();
        assert_eq!(value, &doc);
    }

    #[test]
    fn test_resolve_out_of_range() {
        let doc = yaml("members:\n  - name: Alice\n");
        let err = select(&doc, "members[5].name", &file()).unwrap_err();
        match err {
            YmxError::InvalidPath { path, file, reason } => {
                assert_eq!(path, "members[5].name");
                assert_eq!(file, "team.yaml");
                assert!(reason.contains("out of range"));
            }
            other => panic!("Expected InvalidPath, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_missing_key_and_kind_mismatch() {
        let doc = yaml("members:\n  - name: Alice\n");
        assert!(matches!(
            select(&doc, "absent", &file()),
            Err(YmxError::InvalidPath { .. })
        ));
        // Key step against a sequence.
        assert!(matches!(
            select(&doc, "members.name", &file()),
            Err(YmxError::InvalidPath { .. })
        ));
        // Index step against a mapping.
        assert!(matches!(
            select(&doc, "members[0].name[1]", &file()),
            Err(YmxError::InvalidPath { .. })
        ));
    }
}
