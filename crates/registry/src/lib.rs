//! Fingerprint registry - loads a corpus and dispatches matches by alias
//!
//! Provides:
//! - Corpus sources (directory on disk, embedded bundle)
//! - `FingerprintSet`, the all-or-nothing loaded registry

pub mod fingerprint_set;
pub mod source;

pub use fingerprint_set::FingerprintSet;
pub use source::{DirectorySource, EmbeddedSource};
