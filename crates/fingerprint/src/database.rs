//! Fingerprint databases
//!
//! A database is one corpus document: an ordered list of fingerprints sharing
//! a match target. Declared order is precedence; `match_first` returns the
//! first fingerprint that matches, so specific rules must come before
//! general ones.

use crate::document::DatabaseDocument;
use crate::fingerprint::Fingerprint;
use crate::normalizer;
use recog_common::{DiagnosticSink, LoadOptions, MatchResult, RecogError, RecogResult};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub struct FingerprintDatabase {
    name: String,
    matches: String,
    protocol: String,
    database_type: String,
    preference: String,
    fingerprints: Vec<Fingerprint>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl DatabaseDocument {
    /// Normalize every fingerprint in declared order, stopping at the first error.
    pub fn normalize(self, options: &LoadOptions) -> RecogResult<FingerprintDatabase> {
        let DatabaseDocument {
            name,
            matches,
            protocol,
            database_type,
            preference,
            fingerprints,
        } = self;

        let mut normalized = Vec::with_capacity(fingerprints.len());
        for fp in fingerprints {
            match normalizer::normalize(fp, &preference, options.certainty_policy) {
                Ok(fp) => normalized.push(fp),
                Err(e) => {
                    debug!(database = %name, error = %e, "failed to normalize");
                    return Err(e);
                }
            }
        }

        Ok(FingerprintDatabase {
            name,
            matches,
            protocol,
            database_type,
            preference,
            fingerprints: normalized,
            sink: options.sink.clone(),
        })
    }
}

impl FingerprintDatabase {
    /// Parse and normalize a corpus document.
    pub fn load(name: &str, data: &[u8], options: &LoadOptions) -> RecogResult<Self> {
        DatabaseDocument::parse(name, data)?.normalize(options)
    }

    /// Load a corpus document from disk. The database is named after the file.
    pub fn load_file<P: AsRef<Path>>(path: P, options: &LoadOptions) -> RecogResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| RecogError::Source {
                path: path.display().to_string(),
                reason: "not a file".to_string(),
            })?;
        debug!(path = %path.display(), "loaded fingerprint file");
        Self::load(&name, &data, options)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The match target this database expects as input.
    #[inline]
    #[must_use]
    pub fn matches(&self) -> &str {
        &self.matches
    }

    #[inline]
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[inline]
    #[must_use]
    pub fn database_type(&self) -> &str {
        &self.database_type
    }

    #[inline]
    #[must_use]
    pub fn preference(&self) -> &str {
        &self.preference
    }

    #[inline]
    #[must_use]
    pub fn fingerprints(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    /// Replace the diagnostic sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Option<Arc<dyn DiagnosticSink>>) -> Self {
        self.sink = sink;
        self
    }

    /// First matching fingerprint in declared order.
    #[must_use]
    pub fn match_first(&self, data: &str) -> MatchResult {
        for fp in &self.fingerprints {
            let m = fp.match_text(data);
            if m.matched {
                self.trace_match(data, fp);
                return m;
            }
        }
        self.trace_fail(data);
        MatchResult::no_match()
    }

    /// Every matching fingerprint in declared order.
    #[must_use]
    pub fn match_all(&self, data: &str) -> Vec<MatchResult> {
        let mut ret = Vec::new();
        for fp in &self.fingerprints {
            let m = fp.match_text(data);
            if m.matched {
                self.trace_match(data, fp);
                ret.push(m);
            }
        }
        if ret.is_empty() {
            self.trace_fail(data);
        }
        ret
    }

    fn trace_match(&self, data: &str, fp: &Fingerprint) {
        if let Some(sink) = &self.sink {
            sink.trace(&format!(
                "[recog] {} FP-MATCH {:?} to {:?} ({})",
                self.name,
                data,
                fp.pattern(),
                fp.description().unwrap_or("")
            ));
        }
    }

    fn trace_fail(&self, data: &str) {
        if let Some(sink) = &self.sink {
            sink.trace(&format!("[recog] {} FP-FAIL {:?}", self.name, data));
        }
    }
}

impl fmt::Debug for FingerprintDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintDatabase")
            .field("name", &self.name)
            .field("matches", &self.matches)
            .field("protocol", &self.protocol)
            .field("database_type", &self.database_type)
            .field("preference", &self.preference)
            .field("fingerprints", &self.fingerprints.len())
            .finish()
    }
}
