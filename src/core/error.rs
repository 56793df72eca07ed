//! Error handling for ymx.
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** ([`YmxError`]) for precise handling in code
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # File context and the wrap-once policy
//!
//! Most failures during expansion are tied to a specific document on disk.
//! Variants that carry a `file` field are considered *file-scoped*: once such
//! an error exists anywhere in an error chain, outer layers must not prepend
//! another file prefix, even when the failure crosses an include boundary.
//! [`has_file_context`] is the single place that decision is made.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ymx::core::{YmxError, user_friendly_error};
//!
//! let err = YmxError::UnknownFunction {
//!     name: "frobnicate".to_string(),
//!     file: "team.yaml".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display(); // colored error + suggestion on stderr
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for ymx operations.
///
/// Each variant represents one failure mode of the expansion pipeline and
/// carries the context needed to report it without consulting surrounding
/// state: the offending file, function name, path string, and so on.
#[derive(Error, Debug, Clone)]
pub enum YmxError {
    /// Document file could not be read from disk.
    #[error("Failed to read document '{file}': {reason}")]
    DocumentRead {
        /// Path of the document that could not be read
        file: String,
        /// Underlying I/O failure
        reason: String,
    },

    /// Document text is not valid YAML.
    ///
    /// `reason` includes line/column information when the parser provides a
    /// location.
    #[error("Failed to parse document '{file}': {reason}")]
    DocumentParse {
        /// Path of the document that failed to parse
        file: String,
        /// Parser message, with line/column when available
        reason: String,
    },

    /// An invocation node named a function the registry does not know.
    #[error("Unknown transformation function '{name}' in file '{file}'")]
    UnknownFunction {
        /// The function name from the `_f` key
        name: String,
        /// Document containing the invocation node
        file: String,
    },

    /// A function name was re-registered with a different implementation.
    #[error("Attempting to register a different function under existing name '{name}'")]
    ConflictingBinding {
        /// The contested function name
        name: String,
    },

    /// A document handed to the codec lacks `schema_module`/`schema_type`.
    #[error(
        "schema_module and schema_type must be specified in the _meta section of '{file}'"
    )]
    MissingSchemaIdentity {
        /// Document whose metadata is incomplete
        file: String,
    },

    /// A path address failed to parse or to resolve against a document.
    #[error("Invalid path '{path}' in file '{file}': {reason}")]
    InvalidPath {
        /// The offending path string
        path: String,
        /// Document the path was resolved against
        file: String,
        /// What went wrong (bad syntax, missing key, index out of range)
        reason: String,
    },

    /// A function implementation failed during expansion.
    ///
    /// Wraps the underlying failure exactly once with function name and file
    /// context; see the module docs for the wrap-once policy.
    #[error("Error in transformation '{function}' in file '{file}': {reason}")]
    Transformation {
        /// Name of the function that failed
        function: String,
        /// Document being expanded when the failure occurred
        file: String,
        /// Message of the underlying failure
        reason: String,
    },

    /// The external codec collaborator reported a failure.
    #[error("Codec error for '{file}': {reason}")]
    Codec {
        /// Document being encoded or decoded
        file: String,
        /// Opaque codec failure, passed through
        reason: String,
    },

    /// An include chain looped back to a document still being expanded.
    #[error("Circular include detected: '{file}' is already being expanded")]
    CircularInclude {
        /// Document that re-entered its own expansion
        file: String,
    },

    /// `_meta.transformation_module` named a plugin set nobody registered.
    #[error("Unknown transformation module '{name}' referenced by file '{file}'")]
    UnknownPluginSource {
        /// The requested plugin-set name
        name: String,
        /// Document whose metadata referenced it
        file: String,
    },

    /// Generic error without a more specific variant.
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl YmxError {
    /// Whether this error already carries the path of an originating file.
    ///
    /// File-scoped errors are wrapped exactly once; outer expansion layers
    /// check this before adding their own context.
    #[must_use]
    pub const fn has_file_context(&self) -> bool {
        matches!(
            self,
            Self::DocumentRead { .. }
                | Self::DocumentParse { .. }
                | Self::UnknownFunction { .. }
                | Self::MissingSchemaIdentity { .. }
                | Self::InvalidPath { .. }
                | Self::Transformation { .. }
                | Self::Codec { .. }
                | Self::CircularInclude { .. }
                | Self::UnknownPluginSource { .. }
        )
    }
}

/// Returns `true` when any error in `error`'s chain is a file-scoped
/// [`YmxError`].
#[must_use]
pub fn chain_has_file_context(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<YmxError>())
        .any(YmxError::has_file_context)
}

/// Error wrapper that adds user-friendly presentation for the CLI.
///
/// Wraps a [`YmxError`] with an optional suggestion (actionable next step,
/// shown in green) and optional details (background, shown in yellow).
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: YmxError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: YmxError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add an actionable suggestion for resolving the error.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add background details explaining the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details, and suggestion to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to an [`ErrorContext`] with tailored suggestions.
///
/// Recognizes [`YmxError`] variants anywhere in the chain and maps each to a
/// suggestion appropriate for CLI users; unrecognized errors are reported
/// with their full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(ymx_error) = error.downcast_ref::<YmxError>() {
        return create_error_context(ymx_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(YmxError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(YmxError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check file ownership and permissions on the target path");
            }
            _ => {}
        }
    }

    // Generic error: include the full cause chain for diagnostics.
    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(YmxError::Other { message })
}

fn create_error_context(error: YmxError) -> ErrorContext {
    match &error {
        YmxError::DocumentRead { file, .. } => {
            let file = file.clone();
            ErrorContext::new(error).with_suggestion(format!(
                "Check that '{file}' exists and is readable. Relative includes resolve against the including document's directory"
            ))
        }

        YmxError::DocumentParse { .. } => ErrorContext::new(error)
            .with_suggestion(
                "Check the YAML syntax at the reported line and column. Common issues: inconsistent indentation, unquoted strings containing ':', tab characters",
            ),

        YmxError::UnknownFunction { name, .. } => {
            let name = name.clone();
            ErrorContext::new(error)
                .with_suggestion(format!(
                    "Register '{name}' on the session, or declare a transformation_module providing it in the document's _meta section"
                ))
                .with_details(
                    "Invocation nodes ({_f, _a}) are expanded through the function registry; only registered names are invocable",
                )
        }

        YmxError::ConflictingBinding { .. } => ErrorContext::new(error).with_suggestion(
            "Rename one of the conflicting functions, or reuse the same function set instead of registering a second implementation",
        ),

        YmxError::MissingSchemaIdentity { file } => {
            let file = file.clone();
            ErrorContext::new(error).with_suggestion(format!(
                "Add a _meta section with schema_module and schema_type to '{file}'"
            ))
        }

        YmxError::InvalidPath { .. } => ErrorContext::new(error).with_details(
            "Path addresses use '.' to descend into mappings and '[n]' to index sequences, e.g. 'members[0].name'",
        ),

        YmxError::Codec { .. } => ErrorContext::new(error).with_details(
            "Binary encode/decode is delegated to the configured schema codec; the failure above was reported by it",
        ),

        YmxError::CircularInclude { file } => {
            let file = file.clone();
            ErrorContext::new(error).with_suggestion(format!(
                "Break the cycle: '{file}' is included, directly or through a chain, from inside its own expansion"
            ))
        }

        YmxError::UnknownPluginSource { name, .. } => {
            let name = name.clone();
            ErrorContext::new(error).with_suggestion(format!(
                "Register a function set named '{name}' on the session before loading this document"
            ))
        }

        _ => ErrorContext::new(error),
    }
}
