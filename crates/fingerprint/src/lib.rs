//! Fingerprint Engine - banner recognition against a pattern corpus
//!
//! This crate provides:
//! - Corpus document parsing (`document`)
//! - Pattern normalization and compilation (`normalizer`)
//! - Attribute extraction from matched banners (`fingerprint`)
//! - Ordered fingerprint databases (`database`)
//! - Offline example verification (`verify`) and conformance checks (`lint`)

mod database;
mod document;
mod fingerprint;
pub mod lint;
pub mod normalizer;
mod verify;

pub use database::FingerprintDatabase;
pub use document::{DatabaseDocument, FingerprintDocument};
pub use fingerprint::{Example, Fingerprint};
pub use lint::{lint_database, LintIssue, LintKind};
pub use normalizer::{compile_pattern, CompiledPattern, MatcherOptions};
