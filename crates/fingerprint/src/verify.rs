//! Offline example verification
//!
//! Every `<example>` must match its own fingerprint without soft errors and
//! produce each declared attribute exactly. Example data is either inline,
//! read from `<base>/<_filename>`, and optionally base64 encoded.

use crate::database::FingerprintDatabase;
use crate::fingerprint::{Example, Fingerprint};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use recog_common::VerificationError;
use std::path::Path;
use tracing::debug;

const BASE64_ENCODING: &str = "base64";

/// Make line breaks visible in error messages.
fn escape_example(data: &str) -> String {
    data.replace('\n', "\\n").replace('\r', "\\r")
}

impl Fingerprint {
    /// Resolve an example to the text that should be matched.
    pub fn example_data(
        &self,
        example: &Example,
        base: &Path,
    ) -> Result<String, VerificationError> {
        let mut data = match example.filename() {
            Some(file) => {
                let path = base.join(file);
                let bytes = std::fs::read(&path).map_err(|source| VerificationError::ExternalFile {
                    pattern: self.pattern().to_string(),
                    path: path.display().to_string(),
                    source,
                })?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
            None => example.text().to_string(),
        };

        if let Some(encoding) = example.encoding() {
            if encoding != BASE64_ENCODING {
                return Err(VerificationError::UnsupportedEncoding {
                    pattern: self.pattern().to_string(),
                    encoding: encoding.to_string(),
                });
            }
            let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
            let decoded =
                STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|e| VerificationError::Base64 {
                        pattern: self.pattern().to_string(),
                        data: compact.clone(),
                        reason: e.to_string(),
                    })?;
            data = String::from_utf8_lossy(&decoded).into_owned();
        }

        Ok(data)
    }

    /// Check every example of this fingerprint.
    pub fn verify_examples(&self, base: &Path) -> Result<(), VerificationError> {
        for example in self.examples() {
            let data = self.example_data(example, base)?;
            let escaped = escape_example(&data);

            let m = self.match_text(&data);
            if !m.matched {
                return Err(VerificationError::NoMatch {
                    pattern: self.pattern().to_string(),
                    example: escaped,
                });
            }
            if !m.errors.is_empty() {
                return Err(VerificationError::MatchErrors {
                    pattern: self.pattern().to_string(),
                    example: escaped,
                    errors: m.errors,
                });
            }

            for (attribute, expected) in example.expected() {
                match m.get(attribute) {
                    None => {
                        return Err(VerificationError::MissingAttribute {
                            pattern: self.pattern().to_string(),
                            example: escaped,
                            attribute: attribute.to_string(),
                        })
                    }
                    Some(actual) if actual != expected => {
                        return Err(VerificationError::MismatchedAttribute {
                            pattern: self.pattern().to_string(),
                            example: escaped,
                            attribute: attribute.to_string(),
                            expected: expected.to_string(),
                            actual: actual.to_string(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }
}

impl FingerprintDatabase {
    /// Check the examples of every fingerprint, stopping at the first failure.
    ///
    /// `base` is the directory external example files are resolved against.
    pub fn verify_examples(&self, base: &Path) -> Result<(), VerificationError> {
        for fp in self.fingerprints() {
            if let Err(e) = fp.verify_examples(base) {
                debug!(database = %self.name(), error = %e, "failed to verify examples");
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::MODELS;
    use recog_common::{LoadOptions, MatchError};

    fn load(xml: &str) -> FingerprintDatabase {
        FingerprintDatabase::load("test.xml", xml.as_bytes(), &LoadOptions::default()).unwrap()
    }

    #[test]
    fn declared_examples_pass() {
        let db = load(MODELS);
        let base = Path::new(".");
        assert!(db.verify_examples(base).is_ok());
        // a second run over the same database gives the same outcome
        assert!(db.verify_examples(base).is_ok());
    }

    #[test]
    fn base64_example_with_padding() {
        // "Xerox ColorQube 8570DT"
        let xml = r#"<fingerprints matches="pjl">
  <fingerprint pattern="^Xerox ColorQube ([A-Za-z0-9]+)$">
    <example _encoding="base64" os.product="8570DT">
      WGVyb3ggQ29s
      b3JRdWJlIDg1
      NzBEVA==
    </example>
    <param pos="0" name="os.vendor" value="Xerox"/>
    <param pos="1" name="os.product"/>
  </fingerprint>
</fingerprints>"#;
        let db = load(xml);
        let fp = &db.fingerprints()[0];
        let data = fp.example_data(&fp.examples()[0], Path::new(".")).unwrap();
        assert_eq!(data, "Xerox ColorQube 8570DT");
        assert!(db.verify_examples(Path::new(".")).is_ok());
    }

    #[test]
    fn bad_base64_is_reported() {
        let xml = r#"<fingerprints matches="m">
  <fingerprint pattern="x">
    <example _encoding="base64">!!!notbase64</example>
  </fingerprint>
</fingerprints>"#;
        let err = load(xml).verify_examples(Path::new(".")).unwrap_err();
        assert!(matches!(err, VerificationError::Base64 { .. }));
    }

    #[test]
    fn external_example_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("banner.txt"), "220 ProFTPD 1.3.5 Server\r\n").unwrap();

        let xml = r#"<fingerprints matches="ftp.banner">
  <fingerprint pattern="^220 ProFTPD ([\d.]+) Server">
    <example _filename="banner.txt" service.version="1.3.5"/>
    <param pos="0" name="service.product" value="ProFTPD"/>
    <param pos="1" name="service.version"/>
  </fingerprint>
</fingerprints>"#;
        let db = load(xml);
        assert!(db.verify_examples(dir.path()).is_ok());

        let missing = tempfile::tempdir().unwrap();
        let err = db.verify_examples(missing.path()).unwrap_err();
        match err {
            VerificationError::ExternalFile { path, .. } => assert!(path.ends_with("banner.txt")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mismatched_attribute_names_everything() {
        let xml = r#"<fingerprints matches="m">
  <fingerprint pattern="^Model (\w+)\r?$">
    <example hw.product="Y">Model Z&#13;</example>
    <param pos="1" name="hw.product"/>
  </fingerprint>
</fingerprints>"#;
        let err = load(xml).verify_examples(Path::new(".")).unwrap_err();
        match &err {
            VerificationError::MismatchedAttribute {
                pattern,
                example,
                attribute,
                expected,
                actual,
            } => {
                assert_eq!(pattern, "^Model (\\w+)\\r?$");
                assert_eq!(example, "Model Z\\r");
                assert_eq!(attribute, "hw.product");
                assert_eq!(expected, "Y");
                assert_eq!(actual, "Z");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("hw.product: Y != Z"));
    }

    #[test]
    fn missing_attribute_is_reported() {
        let xml = r#"<fingerprints matches="m">
  <fingerprint pattern="^Model">
    <example hw.product="Model">Model</example>
  </fingerprint>
</fingerprints>"#;
        let err = load(xml).verify_examples(Path::new(".")).unwrap_err();
        assert!(matches!(
            err,
            VerificationError::MissingAttribute { ref attribute, .. } if attribute == "hw.product"
        ));
    }

    #[test]
    fn example_that_does_not_match() {
        let xml = r#"<fingerprints matches="m">
  <fingerprint pattern="^Model$">
    <example>Other
line</example>
  </fingerprint>
</fingerprints>"#;
        let err = load(xml).verify_examples(Path::new(".")).unwrap_err();
        match err {
            VerificationError::NoMatch { example, .. } => assert_eq!(example, "Other\\nline"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn soft_errors_fail_verification() {
        let xml = r#"<fingerprints matches="m">
  <fingerprint pattern="^Model (\w+)$">
    <example>Model Z</example>
    <param pos="2" name="hw.product"/>
  </fingerprint>
</fingerprints>"#;
        let err = load(xml).verify_examples(Path::new(".")).unwrap_err();
        match err {
            VerificationError::MatchErrors { errors, .. } => {
                assert!(matches!(errors[0], MatchError::NotCaptured { .. }))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let xml = r#"<fingerprints matches="m">
  <fingerprint pattern="x">
    <example _encoding="hex">78</example>
  </fingerprint>
</fingerprints>"#;
        let err = load(xml).verify_examples(Path::new(".")).unwrap_err();
        assert!(matches!(err, VerificationError::UnsupportedEncoding { .. }));
    }
}
