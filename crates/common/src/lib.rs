//! Recog Common - Shared types and traits
//!
//! This crate provides the types, collaborator traits, and error enums used
//! across the recog fingerprint engine.

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{MatchError, RecogError, RecogResult, VerificationError};
pub use traits::{DiagnosticSink, FingerprintSource, SourceEntry, TracingSink};
pub use types::{
    CertaintyPolicy, ExampleCase, LoadOptions, MatchResult, ParameterRule, CERTAINTY_KEY,
    DEFAULT_CERTAINTY, DESCRIPTION_KEY, EXAMPLE_ENCODING, EXAMPLE_FILENAME, TEMP_PREFIX,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
