//! Core data types shared by the fingerprint engine and its front ends.

use crate::error::MatchError;
use crate::traits::DiagnosticSink;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Certainty assigned to fingerprints that do not declare one.
pub const DEFAULT_CERTAINTY: &str = "0.85";

/// Attribute name carrying the fingerprint certainty in match results.
pub const CERTAINTY_KEY: &str = "fp.certainty";

/// Attribute name carrying the fingerprint description in match results.
pub const DESCRIPTION_KEY: &str = "matched";

/// Attributes with this prefix only feed template substitution.
pub const TEMP_PREFIX: &str = "_tmp.";

/// Example attribute naming an external file that holds the example data.
pub const EXAMPLE_FILENAME: &str = "_filename";

/// Example attribute naming the encoding of the example data.
pub const EXAMPLE_ENCODING: &str = "_encoding";

/// One `<param>` record: where an attribute value comes from.
///
/// `position` is kept exactly as authored. `"0"` means `value` is a literal
/// (possibly holding `{name}` templates); anything else must parse as a
/// 1-based capture index at match time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRule {
    pub position: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ParameterRule {
    #[inline]
    #[must_use]
    pub fn literal<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            position: "0".to_string(),
            name: name.into(),
            value: Some(value.into()),
        }
    }

    #[inline]
    #[must_use]
    pub fn capture<N: Into<String>>(name: N, index: usize) -> Self {
        Self {
            position: index.to_string(),
            name: name.into(),
            value: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.position == "0"
    }

    /// Capture index of a non-literal position.
    ///
    /// The position is parsed as written, without trimming; anything but a
    /// positive integer is an `InvalidPosition` error.
    pub fn capture_index(&self) -> Result<usize, MatchError> {
        let invalid = |reason: String| MatchError::InvalidPosition {
            position: self.position.clone(),
            reason,
        };
        let index = self.position.parse::<i64>().map_err(|e| invalid(e.to_string()))?;
        if index <= 0 {
            return Err(invalid("must be a positive capture index".to_string()));
        }
        usize::try_from(index).map_err(|e| invalid(e.to_string()))
    }

    #[inline]
    #[must_use]
    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// One `<example>` record.
///
/// `attributes` keeps the declared order; reserved `_encoding` / `_filename`
/// entries are metadata, every other entry is an expected output value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleCase {
    pub text: String,
    pub attributes: Vec<(String, String)>,
}

impl ExampleCase {
    #[must_use]
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Whether an attribute name is example metadata rather than expected output.
    #[inline]
    #[must_use]
    pub fn is_metadata(name: &str) -> bool {
        name == EXAMPLE_ENCODING || name == EXAMPLE_FILENAME
    }
}

/// Outcome of matching one input against a fingerprint, database, or set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    pub values: BTreeMap<String, String>,
    #[serde(serialize_with = "serialize_errors", skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<MatchError>,
}

impl MatchResult {
    #[inline]
    #[must_use]
    pub fn no_match() -> Self {
        Self::default()
    }

    /// Unmatched result carrying a lookup error.
    #[must_use]
    pub fn missing_database<S: Into<String>>(name: S) -> Self {
        Self {
            matched: false,
            values: BTreeMap::new(),
            errors: vec![MatchError::MissingDatabase(name.into())],
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn serialize_errors<S: Serializer>(
    errors: &[MatchError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

/// How fingerprints without an explicit certainty get one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertaintyPolicy {
    /// Use [`DEFAULT_CERTAINTY`].
    #[default]
    Fixed,
    /// Use the owning database's `preference`, falling back to the fixed default.
    InheritPreference,
}

impl CertaintyPolicy {
    /// Certainty for a fingerprint, given its own value and the database preference.
    #[must_use]
    pub fn resolve(&self, own: Option<&str>, preference: &str) -> String {
        match own.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => c.to_string(),
            None => match self {
                CertaintyPolicy::InheritPreference if !preference.trim().is_empty() => {
                    preference.trim().to_string()
                }
                _ => DEFAULT_CERTAINTY.to_string(),
            },
        }
    }
}

impl fmt::Display for CertaintyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CertaintyPolicy::Fixed => "fixed",
            CertaintyPolicy::InheritPreference => "preference",
        };
        f.write_str(s)
    }
}

/// Options for loading and normalizing fingerprint databases.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default)]
    pub certainty_policy: CertaintyPolicy,
    /// Entries whose name contains this marker are loaded.
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(skip)]
    pub sink: Option<Arc<dyn DiagnosticSink>>,
}

fn default_extension() -> String {
    ".xml".to_string()
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            certainty_policy: CertaintyPolicy::default(),
            extension: default_extension(),
            sink: None,
        }
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("certainty_policy", &self.certainty_policy)
            .field("extension", &self.extension)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl LoadOptions {
    #[inline]
    #[must_use]
    pub fn with_certainty_policy(mut self, policy: CertaintyPolicy) -> Self {
        self.certainty_policy = policy;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_extension<S: Into<String>>(mut self, extension: S) -> Self {
        self.extension = extension.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}
