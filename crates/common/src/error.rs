//! Error types for the recog engine
//!
//! Fatal errors (load, normalize, verify) are `RecogError`. Soft defects found
//! while extracting attributes are `MatchError` values carried inside a
//! `MatchResult` and never abort a match.

use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum RecogError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("source error: {path}: {reason}")]
    Source { path: String, reason: String },

    #[error("XML error in {name}: {reason}")]
    Xml { name: String, reason: String },

    #[error("invalid fingerprint document {name}: {reason}")]
    Document { name: String, reason: String },

    #[error("bad regexp [{pattern}]: {reason}")]
    Normalize { pattern: String, reason: String },

    #[error("failed to load {name}: {source}")]
    Load {
        name: String,
        #[source]
        source: Box<RecogError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl RecogError {
    /// Wrap an error with the name of the database being loaded.
    pub fn load(name: impl Into<String>, source: RecogError) -> Self {
        RecogError::Load {
            name: name.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias for recog operations
pub type RecogResult<T> = Result<T, RecogError>;

/// Non-fatal defects recorded during extraction or lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("param index {position} is invalid: {reason}")]
    InvalidPosition { position: String, reason: String },

    #[error("param index {position} was not captured ({captured} elements)")]
    NotCaptured { position: String, captured: usize },

    #[error("param {key} could not be substituted")]
    Unsubstituted { key: String },

    #[error("database {0} is missing")]
    MissingDatabase(String),
}

/// Failures raised by the offline example verification.
///
/// `pattern` is the fingerprint's pattern text, `example` the escaped example
/// data (`\n` and `\r` made visible).
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("external example file: {pattern}: {source} ({path})")]
    ExternalFile {
        pattern: String,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("base64: {pattern}: {reason} ({data})")]
    Base64 {
        pattern: String,
        data: String,
        reason: String,
    },

    #[error("unsupported example encoding {encoding} for '{pattern}'")]
    UnsupportedEncoding { pattern: String, encoding: String },

    #[error("failed to match '{pattern}' ({example})")]
    NoMatch { pattern: String, example: String },

    #[error("failed to match '{pattern}' ({example}) with errors: {}", join_errors(.errors))]
    MatchErrors {
        pattern: String,
        example: String,
        errors: Vec<MatchError>,
    },

    #[error("'{pattern}' {example} is missing attribute {attribute}")]
    MissingAttribute {
        pattern: String,
        example: String,
        attribute: String,
    },

    #[error("'{pattern}' ({example}) has mismatched attribute value for {attribute}: {expected} != {actual}")]
    MismatchedAttribute {
        pattern: String,
        example: String,
        attribute: String,
        expected: String,
        actual: String,
    },
}

fn join_errors(errors: &[MatchError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
