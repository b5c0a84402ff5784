//! Output formatting for match results

use anyhow::Result;
use recog_registry::FingerprintSet;
use std::io::Write;

/// Match every whitespace-separated term of `text` against each database
/// and print the attributes of every first match as one JSON object per line.
///
/// Returns the number of lines written.
pub fn print_matches<W: Write>(set: &FingerprintSet, text: &str, out: &mut W) -> Result<usize> {
    let mut printed = 0;
    for term in text.split_whitespace() {
        for db in set.databases() {
            let m = db.match_first(term);
            if m.matched {
                serde_json::to_writer(&mut *out, &m.values)?;
                writeln!(out)?;
                printed += 1;
            }
        }
    }
    Ok(printed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recog_common::LoadOptions;

    static BUNDLE: &[(&str, &[u8])] = &[(
        "http_servers.xml",
        br#"<fingerprints matches="http_header.server">
  <fingerprint pattern="^nginx/([\d.]+)$">
    <description>nginx</description>
    <param pos="0" name="service.product" value="nginx"/>
    <param pos="1" name="service.version"/>
  </fingerprint>
</fingerprints>"#,
    )];

    #[test]
    fn prints_one_line_per_match() {
        let set = FingerprintSet::load_embedded(BUNDLE, &LoadOptions::default()).unwrap();
        let mut out = Vec::new();
        let n = print_matches(&set, "nginx/1.24.0 Apache nginx/1.25.3", &mut out).unwrap();
        assert_eq!(n, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            r#"{"fp.certainty":"0.85","matched":"nginx","service.product":"nginx","service.version":"1.24.0"}"#
        );
        assert!(lines[1].contains(r#""service.version":"1.25.3""#));
    }

    #[test]
    fn nothing_printed_without_match() {
        let set = FingerprintSet::load_embedded(BUNDLE, &LoadOptions::default()).unwrap();
        let mut out = Vec::new();
        assert_eq!(print_matches(&set, "Apache/2.4", &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
