//! Corpus conformance checks
//!
//! Authoring rules the engine relies on but never enforces while matching:
//! capture accounting, parameter naming, and precedence (no example may be
//! claimed by an earlier, more general fingerprint).

use crate::database::FingerprintDatabase;
use crate::fingerprint::Fingerprint;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

static PARAM_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:cookie|[^.]+\..*)$").expect("param name pattern is valid"));
static GROUPED_MULTILINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r".+\(\?[gixsu]*m[gixsu]*:[^)]*\)").expect("grouped multiline pattern is valid")
});
static GROUPED_ICASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r".+\(\?[gmxsu]*i[gmxsu]*:[^)]*\)").expect("grouped icase pattern is valid")
});
static INTERPOLATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^\s{}]+)\}").expect("interpolation pattern is valid"));

/// Accepted range for a database `preference`: (0.1, 0.9].
const PREFERENCE_MIN: f64 = 0.1;
const PREFERENCE_MAX: f64 = 0.9;

#[derive(Debug, Clone, PartialEq)]
pub enum LintKind {
    PreferenceOutOfRange(f64),
    MissingDescription,
    DuplicateDescription,
    NoParams,
    GroupedCaseInsensitive,
    GroupedMultiline,
    InvalidParamName(String),
    DuplicateParam(String),
    InvalidPosition { name: String, position: String },
    CaptureWithValue { name: String, position: usize },
    LiteralWithoutValue(String),
    UnknownInterpolation { name: String, reference: String },
    DeviceMismatch { hw: String, os: String },
    CaptureCount { groups: usize, extractions: usize },
    ShadowedBy { earlier: usize, example: String },
    UnresolvedExample { example: String, reason: String },
}

impl fmt::Display for LintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintKind::PreferenceOutOfRange(p) => {
                write!(f, "fingerprint db preference {} should be between 0.1 - 0.9", p)
            }
            LintKind::MissingDescription => f.write_str("has no description"),
            LintKind::DuplicateDescription => {
                f.write_str("has a duplicate fingerprint description")
            }
            LintKind::NoParams => {
                f.write_str("should assert facts about data or set certainty params to 0.0")
            }
            LintKind::GroupedCaseInsensitive => {
                f.write_str("regex case-sensitivity flag should be at the start of the regex")
            }
            LintKind::GroupedMultiline => {
                f.write_str("regex multiline flag should be at the start of the regex")
            }
            LintKind::InvalidParamName(n) => {
                write!(f, "fingerprint parameter name is invalid: {:?}", n)
            }
            LintKind::DuplicateParam(n) => {
                write!(f, "has a duplicate fingerprint parameter: {:?}", n)
            }
            LintKind::InvalidPosition { name, position } => {
                write!(f, "parameter {:?} has an invalid position {:?}", name, position)
            }
            LintKind::CaptureWithValue { name, position } => write!(
                f,
                "parameter {:?} is set from a capture group({}), but a value was provided",
                name, position
            ),
            LintKind::LiteralWithoutValue(n) => {
                write!(f, "{} is not a capture (pos=0) but no value was provided", n)
            }
            LintKind::UnknownInterpolation { name, reference } => write!(
                f,
                "{:?} uses interpolated value {:?} that does not exist in list of fingerprint parameters",
                name, reference
            ),
            LintKind::DeviceMismatch { hw, os } => write!(
                f,
                "has both hw.device ({}) and os.device ({}) but with differing values",
                hw, os
            ),
            LintKind::CaptureCount { groups, extractions } => write!(
                f,
                "regex has {} capture groups, but the fingerprint expected {} extraction(s)",
                groups, extractions
            ),
            LintKind::ShadowedBy { earlier, example } => write!(
                f,
                "example {:?} matched previous fingerprint #{}; consider reordering the fingerprints",
                example, earlier
            ),
            LintKind::UnresolvedExample { example, reason } => {
                write!(f, "example {:?} could not be resolved: {}", example, reason)
            }
        }
    }
}

/// One conformance finding. `index` is `None` for database-level findings.
#[derive(Debug, Clone, PartialEq)]
pub struct LintIssue {
    pub database: String,
    pub index: Option<usize>,
    pub description: Option<String>,
    pub kind: LintKind,
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.index, &self.description) {
            (Some(i), Some(d)) => write!(f, "{} #{} ({}): {}", self.database, i, d, self.kind),
            (Some(i), None) => write!(f, "{} #{}: {}", self.database, i, self.kind),
            _ => write!(f, "{}: {}", self.database, self.kind),
        }
    }
}

/// Run every check over a database. External example files resolve against `base`.
#[must_use]
pub fn lint_database(db: &FingerprintDatabase, base: &Path) -> Vec<LintIssue> {
    let mut issues = Vec::new();

    if let Ok(preference) = db.preference().trim().parse::<f64>() {
        if preference <= PREFERENCE_MIN || preference > PREFERENCE_MAX {
            issues.push(LintIssue {
                database: db.name().to_string(),
                index: None,
                description: None,
                kind: LintKind::PreferenceOutOfRange(preference),
            });
        }
    }

    let mut descriptions = HashSet::new();
    for (i, fp) in db.fingerprints().iter().enumerate() {
        let mut push = |kind: LintKind| {
            issues.push(LintIssue {
                database: db.name().to_string(),
                index: Some(i),
                description: fp.description().map(str::to_string),
                kind,
            })
        };

        match fp.description() {
            None => push(LintKind::MissingDescription),
            Some(d) if !descriptions.insert(d) => push(LintKind::DuplicateDescription),
            Some(_) => {}
        }

        for kind in check_fingerprint(fp) {
            push(kind);
        }

        for kind in shadowing(db, i, base) {
            push(kind);
        }
    }

    issues
}

/// Checks that only need the fingerprint itself.
#[must_use]
pub fn check_fingerprint(fp: &Fingerprint) -> Vec<LintKind> {
    let mut found = Vec::new();

    if fp.params().is_empty() {
        found.push(LintKind::NoParams);
    }
    if GROUPED_ICASE_RE.is_match(fp.pattern()) {
        found.push(LintKind::GroupedCaseInsensitive);
    }
    if GROUPED_MULTILINE_RE.is_match(fp.pattern()) {
        found.push(LintKind::GroupedMultiline);
    }

    let declared: HashSet<&str> = fp.params().iter().map(|p| p.name.as_str()).collect();
    let mut names = HashSet::new();
    let mut captures = HashSet::new();
    let (mut hw_device, mut os_device) = (String::new(), String::new());

    for param in fp.params() {
        let value = param.value_str().trim();
        if !PARAM_NAME_RE.is_match(&param.name) {
            found.push(LintKind::InvalidParamName(param.name.clone()));
        } else if !names.insert(param.name.as_str()) {
            found.push(LintKind::DuplicateParam(param.name.clone()));
        }

        match param.name.as_str() {
            "os.device" => os_device = value.to_string(),
            "hw.device" => hw_device = value.to_string(),
            _ => {}
        }

        let capture = if param.is_literal() {
            None
        } else {
            match param.capture_index() {
                Ok(index) => Some(index),
                Err(_) => {
                    found.push(LintKind::InvalidPosition {
                        name: param.name.clone(),
                        position: param.position.clone(),
                    });
                    continue;
                }
            }
        };

        if let Some(position) = capture {
            captures.insert(position);
            if !value.is_empty() {
                found.push(LintKind::CaptureWithValue {
                    name: param.name.clone(),
                    position,
                });
            }
        } else {
            if value.is_empty() {
                found.push(LintKind::LiteralWithoutValue(param.name.clone()));
            }
            for cap in INTERPOLATION_RE.captures_iter(value) {
                let reference = &cap[1];
                if !declared.contains(reference) {
                    found.push(LintKind::UnknownInterpolation {
                        name: param.name.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
        }
    }

    if !hw_device.is_empty() && !os_device.is_empty() && hw_device != os_device {
        found.push(LintKind::DeviceMismatch {
            hw: hw_device,
            os: os_device,
        });
    }

    if fp.capture_groups() != captures.len() {
        found.push(LintKind::CaptureCount {
            groups: fp.capture_groups(),
            extractions: captures.len(),
        });
    }

    found
}

/// Examples of fingerprint `index` that an earlier fingerprint already
/// matches, and examples whose data cannot be read.
fn shadowing(db: &FingerprintDatabase, index: usize, base: &Path) -> Vec<LintKind> {
    let fps = db.fingerprints();
    let fp = &fps[index];
    let mut found = Vec::new();
    for example in fp.examples() {
        let label = example.filename().unwrap_or(example.text()).to_string();
        let data = match fp.example_data(example, base) {
            Ok(data) => data,
            Err(e) => {
                found.push(LintKind::UnresolvedExample {
                    example: label,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if let Some(earlier) = fps[..index].iter().position(|prev| prev.is_match(&data)) {
            found.push(LintKind::ShadowedBy {
                earlier,
                example: label,
            });
        }
    }
    found
}
