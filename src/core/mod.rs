//! Core types and error handling for ymx.
//!
//! This module hosts the error enum shared by every stage of the expansion
//! pipeline ([`YmxError`]) plus the CLI-facing error presentation layer
//! ([`ErrorContext`], [`user_friendly_error`]).

pub mod error;

pub use error::{ErrorContext, YmxError, user_friendly_error};
