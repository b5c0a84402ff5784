//! Normalized fingerprints and the match engine
//!
//! Matching is two passes over the parameter rules:
//! 1. literal (`pos="0"`) values and capture groups are copied into the result
//! 2. `{name}` templates inside literal values are filled in from the result
//!
//! A bad rule or an unresolved template is recorded as a soft `MatchError`
//! and extraction carries on with the remaining rules.

use crate::normalizer::{CompiledPattern, MatcherOptions};
use once_cell::sync::Lazy;
use recog_common::{
    ExampleCase, MatchError, MatchResult, ParameterRule, CERTAINTY_KEY, DESCRIPTION_KEY,
    EXAMPLE_ENCODING, EXAMPLE_FILENAME, TEMP_PREFIX,
};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap, HashSet};

/// `{name}` placeholder inside a literal parameter value.
static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[a-zA-Z0-9._\-]+\}").expect("template pattern is valid"));

/// Literal values starting with this prefix are CPE strings.
const CPE_PREFIX: &str = "cpe:";

/// Template key that renders as `-` in CPE strings when empty.
const CPE_VERSION_KEY: &str = "service.version";

/// An example with its declared attributes flattened into a lookup.
#[derive(Debug, Clone)]
pub struct Example {
    case: ExampleCase,
    lookup: HashMap<String, String>,
}

impl Example {
    pub(crate) fn new(case: ExampleCase, lookup: HashMap<String, String>) -> Self {
        Self { case, lookup }
    }

    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.case.text
    }

    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.lookup.get(name).map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.get(EXAMPLE_FILENAME)
    }

    #[inline]
    #[must_use]
    pub fn encoding(&self) -> Option<&str> {
        self.get(EXAMPLE_ENCODING)
    }

    /// Expected output attributes, in declared order, each name once.
    pub fn expected(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        let mut seen = HashSet::new();
        self.case
            .attributes
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| !ExampleCase::is_metadata(k))
            .filter(move |k| seen.insert(*k))
            .filter_map(move |k| self.get(k).map(|v| (k, v)))
    }

    #[inline]
    #[must_use]
    pub fn case(&self) -> &ExampleCase {
        &self.case
    }
}

/// A normalized, immutable fingerprint definition.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pattern: String,
    flags: String,
    certainty: String,
    description: Option<String>,
    params: Vec<ParameterRule>,
    examples: Vec<Example>,
    compiled: CompiledPattern,
}

impl Fingerprint {
    pub(crate) fn from_parts(
        pattern: String,
        flags: String,
        certainty: String,
        description: Option<String>,
        params: Vec<ParameterRule>,
        examples: Vec<Example>,
        compiled: CompiledPattern,
    ) -> Self {
        Self {
            pattern,
            flags,
            certainty,
            description,
            params,
            examples,
            compiled,
        }
    }

    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> &str {
        &self.flags
    }

    #[inline]
    #[must_use]
    pub fn certainty(&self) -> &str {
        &self.certainty
    }

    #[inline]
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &[ParameterRule] {
        &self.params
    }

    #[inline]
    #[must_use]
    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    #[inline]
    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.compiled.regex
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> MatcherOptions {
        self.compiled.options
    }

    /// Number of capture groups in the compiled pattern, excluding group 0.
    #[inline]
    #[must_use]
    pub fn capture_groups(&self) -> usize {
        self.compiled.regex.captures_len() - 1
    }

    #[inline]
    #[must_use]
    pub fn is_match(&self, data: &str) -> bool {
        self.compiled.regex.is_match(data)
    }

    /// Match `data` and extract attributes.
    #[must_use]
    pub fn match_text(&self, data: &str) -> MatchResult {
        let Some(caps) = self.compiled.regex.captures(data) else {
            return MatchResult::no_match();
        };

        let mut res = MatchResult {
            matched: true,
            values: BTreeMap::new(),
            errors: Vec::new(),
        };

        if !self.certainty.is_empty() {
            res.values.insert(CERTAINTY_KEY.to_string(), self.certainty.clone());
        }
        if let Some(desc) = self.description.as_deref().filter(|d| !d.is_empty()) {
            res.values.insert(DESCRIPTION_KEY.to_string(), desc.to_string());
        }

        let static_keys = self.extract_params(&caps, &mut res);
        substitute_templates(&static_keys, &mut res);
        res.values.retain(|k, _| !k.starts_with(TEMP_PREFIX));

        res
    }

    /// First pass. Returns the literal keys in declaration order.
    fn extract_params<'a>(&'a self, caps: &Captures<'_>, res: &mut MatchResult) -> Vec<&'a str> {
        let mut static_keys: Vec<&str> = Vec::new();
        for p in &self.params {
            if p.is_literal() {
                res.values.insert(p.name.clone(), p.value_str().to_string());
                if !static_keys.contains(&p.name.as_str()) {
                    static_keys.push(&p.name);
                }
                continue;
            }

            let index = match p.capture_index() {
                Ok(i) => i,
                Err(e) => {
                    res.errors.push(e);
                    continue;
                }
            };
            if index >= caps.len() {
                res.errors.push(MatchError::NotCaptured {
                    position: p.position.clone(),
                    captured: caps.len(),
                });
                continue;
            }

            // an optional group that did not take part in the match reads as ""
            let value = caps.get(index).map_or("", |m| m.as_str());
            res.values.insert(p.name.clone(), value.to_string());
        }
        static_keys
    }
}

/// Second pass: fill `{name}` templates in literal values.
fn substitute_templates(static_keys: &[&str], res: &mut MatchResult) {
    for &key in static_keys {
        let mut errors = Vec::new();
        let replaced = match res.values.get(key) {
            Some(value) if TEMPLATE_RE.is_match(value) => {
                let is_cpe = value.starts_with(CPE_PREFIX);
                let values = &res.values;
                TEMPLATE_RE
                    .replace_all(value, |c: &Captures<'_>| {
                        let placeholder = &c[0];
                        let ref_key = &placeholder[1..placeholder.len() - 1];
                        match values.get(ref_key) {
                            Some(r) if is_cpe && ref_key == CPE_VERSION_KEY && r.is_empty() => {
                                "-".to_string()
                            }
                            Some(r) => r.clone(),
                            None => {
                                errors.push(MatchError::Unsubstituted {
                                    key: ref_key.to_string(),
                                });
                                placeholder.to_string()
                            }
                        }
                    })
                    .trim()
                    .to_string()
            }
            _ => continue,
        };

        res.errors.extend(errors);
        res.values.insert(key.to_string(), replaced);
    }
}
