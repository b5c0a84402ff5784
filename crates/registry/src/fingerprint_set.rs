//! Fingerprint set - every database of a corpus, addressable by alias
//!
//! A database is registered twice: under its source name (`ssh_banners.xml`)
//! and under its `matches` target (`ssh.banner`). Both keys hold the same
//! `Arc`, so either can be used to dispatch a match.

use crate::source::{DirectorySource, EmbeddedSource};
use recog_common::{FingerprintSource, LoadOptions, MatchResult, RecogError, RecogResult};
use recog_fingerprint::FingerprintDatabase;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Loaded, immutable collection of fingerprint databases.
#[derive(Debug, Default, Clone)]
pub struct FingerprintSet {
    databases: HashMap<String, Arc<FingerprintDatabase>>,
    order: Vec<Arc<FingerprintDatabase>>,
}

impl FingerprintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every corpus document at the root of `source`.
    ///
    /// Entries are taken in name order. The first failing document aborts the
    /// load and no set is returned.
    #[instrument(skip_all, fields(source = %source.describe()))]
    pub fn load_from_source(
        source: &dyn FingerprintSource,
        options: &LoadOptions,
    ) -> RecogResult<Self> {
        let mut entries: Vec<_> = source
            .list("")?
            .into_iter()
            .filter(|e| !e.is_dir && e.name.contains(options.extension.as_str()))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut set = Self::new();
        for entry in entries {
            let db = source
                .read(&entry.name)
                .and_then(|data| FingerprintDatabase::load(&entry.name, &data, options))
                .map_err(|e| RecogError::load(entry.name.as_str(), e))?;
            debug!(
                database = %db.name(),
                matches = %db.matches(),
                fingerprints = db.len(),
                "registered database"
            );
            set.register(db);
        }

        info!(databases = set.len(), "loaded fingerprint set");
        Ok(set)
    }

    /// Load every corpus document in a directory.
    pub fn load_dir<P: AsRef<Path>>(path: P, options: &LoadOptions) -> RecogResult<Self> {
        Self::load_from_source(&DirectorySource::new(path.as_ref()), options)
    }

    /// Load a bundle compiled into the binary.
    pub fn load_embedded(
        files: &'static [(&'static str, &'static [u8])],
        options: &LoadOptions,
    ) -> RecogResult<Self> {
        Self::load_from_source(&EmbeddedSource::new(files), options)
    }

    /// Register a database under its name and its match target.
    ///
    /// A document without a `matches` attribute is registered under the
    /// empty key. A later database takes over any alias it shares with an
    /// earlier one.
    pub fn register(&mut self, db: FingerprintDatabase) {
        let db = Arc::new(db);
        self.databases.insert(db.name().to_string(), Arc::clone(&db));
        self.databases.insert(db.matches().to_string(), Arc::clone(&db));
        self.order.push(db);
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<FingerprintDatabase>> {
        self.databases.get(key)
    }

    /// Every registered alias, sorted.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.databases.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Each database once, in registration order.
    #[inline]
    #[must_use]
    pub fn databases(&self) -> &[Arc<FingerprintDatabase>] {
        &self.order
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn match_first(&self, key: &str, data: &str) -> MatchResult {
        match self.databases.get(key) {
            Some(db) => db.match_first(data),
            None => MatchResult::missing_database(key),
        }
    }

    #[must_use]
    pub fn match_all(&self, key: &str, data: &str) -> Vec<MatchResult> {
        match self.databases.get(key) {
            Some(db) => db.match_all(data),
            None => vec![MatchResult::missing_database(key)],
        }
    }

    /// Verify the examples of every database, stopping at the first failure.
    pub fn verify_all(&self, base: &Path) -> RecogResult<()> {
        for db in &self.order {
            db.verify_examples(base)?;
            debug!(database = %db.name(), fingerprints = db.len(), "verified examples");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recog_common::{CertaintyPolicy, MatchError};

    const SSH: &[u8] = br#"<fingerprints matches="ssh.banner" protocol="tcp" preference="0.90">
  <fingerprint pattern="^SSH-2.0-OpenSSH_([\d.]+p?\d*)">
    <description>OpenSSH</description>
    <example service.version="8.9p1">SSH-2.0-OpenSSH_8.9p1 Ubuntu-3</example>
    <param pos="0" name="service.vendor" value="OpenBSD"/>
    <param pos="0" name="service.product" value="OpenSSH"/>
    <param pos="1" name="service.version"/>
  </fingerprint>
  <fingerprint pattern="^SSH-2.0-dropbear_(\S+)">
    <description>Dropbear</description>
    <example service.version="2022.83">SSH-2.0-dropbear_2022.83</example>
    <param pos="0" name="service.product" value="Dropbear SSH"/>
    <param pos="1" name="service.version"/>
  </fingerprint>
</fingerprints>"#;

    const FTP: &[u8] = br#"<fingerprints matches="ftp.banner">
  <fingerprint pattern="^220 ProFTPD ([\d.]+) Server">
    <description>ProFTPD</description>
    <example service.version="1.3.5">220 ProFTPD 1.3.5 Server</example>
    <param pos="0" name="service.product" value="ProFTPD"/>
    <param pos="1" name="service.version"/>
  </fingerprint>
</fingerprints>"#;

    const BROKEN: &[u8] = br#"<fingerprints matches="broken">
  <fingerprint pattern="^(unclosed"/>
</fingerprints>"#;

    static BUNDLE: &[(&str, &[u8])] = &[
        ("ssh_banners.xml", SSH),
        ("ftp_banners.xml", FTP),
        ("README.md", b"not a corpus file"),
    ];

    static BROKEN_BUNDLE: &[(&str, &[u8])] = &[
        ("broken.xml", BROKEN),
        ("ssh_banners.xml", SSH),
    ];

    fn bundle() -> FingerprintSet {
        FingerprintSet::load_embedded(BUNDLE, &LoadOptions::default()).unwrap()
    }

    #[test]
    fn aliases_share_one_database() {
        let set = bundle();
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.aliases(),
            vec!["ftp.banner", "ftp_banners.xml", "ssh.banner", "ssh_banners.xml"]
        );

        let by_name = set.get("ssh_banners.xml").unwrap();
        let by_target = set.get("ssh.banner").unwrap();
        assert!(Arc::ptr_eq(by_name, by_target));
        assert_eq!(by_name.name(), "ssh_banners.xml");
        assert_eq!(by_target.matches(), "ssh.banner");
    }

    #[test]
    fn registration_order_is_sorted_by_name() {
        let set = bundle();
        let names: Vec<&str> = set.databases().iter().map(|db| db.name()).collect();
        assert_eq!(names, vec!["ftp_banners.xml", "ssh_banners.xml"]);
    }

    #[test]
    fn match_first_through_either_alias() {
        let set = bundle();
        let banner = "SSH-2.0-OpenSSH_8.9p1 Ubuntu-3";
        let a = set.match_first("ssh.banner", banner);
        let b = set.match_first("ssh_banners.xml", banner);
        assert!(a.matched);
        assert_eq!(a, b);
        assert_eq!(a.get("service.product"), Some("OpenSSH"));
        assert_eq!(a.get("service.version"), Some("8.9p1"));
        assert_eq!(a.get("matched"), Some("OpenSSH"));
    }

    #[test]
    fn unknown_database() {
        let set = bundle();
        let m = set.match_first("nonexistent.xml", "anything");
        assert!(!m.matched);
        assert_eq!(
            m.errors,
            vec![MatchError::MissingDatabase("nonexistent.xml".to_string())]
        );
        assert_eq!(m.errors[0].to_string(), "database nonexistent.xml is missing");

        let all = set.match_all("nonexistent.xml", "anything");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], m);
    }

    #[test]
    fn match_all_dispatches() {
        let set = bundle();
        assert_eq!(set.match_all("ftp.banner", "220 ProFTPD 1.3.5 Server").len(), 1);
        assert!(set.match_all("ftp.banner", "220 vsFTPd").is_empty());
    }

    #[test]
    fn failing_document_aborts_load() {
        let err =
            FingerprintSet::load_embedded(BROKEN_BUNDLE, &LoadOptions::default()).unwrap_err();
        match &err {
            RecogError::Load { name, source } => {
                assert_eq!(name, "broken.xml");
                assert!(matches!(**source, RecogError::Normalize { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("failed to load broken.xml"));
    }

    #[test]
    fn certainty_policy_reaches_databases() {
        let opts = LoadOptions::default().with_certainty_policy(CertaintyPolicy::InheritPreference);
        let set = FingerprintSet::load_embedded(BUNDLE, &opts).unwrap();
        let ssh = set.match_first("ssh.banner", "SSH-2.0-dropbear_2022.83");
        assert_eq!(ssh.get("fp.certainty"), Some("0.90"));
        // no preference declared, so the fixed default applies
        let ftp = set.match_first("ftp.banner", "220 ProFTPD 1.3.5 Server");
        assert_eq!(ftp.get("fp.certainty"), Some("0.85"));
    }

    #[test]
    fn load_dir_reads_xml_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ssh_banners.xml"), SSH).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested.xml")).unwrap();

        let set = FingerprintSet::load_dir(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.get("ssh.banner").is_some());
        assert!(set.verify_all(dir.path()).is_ok());
    }

    #[test]
    fn load_dir_missing_directory() {
        let err = FingerprintSet::load_dir("/nonexistent/recog", &LoadOptions::default());
        assert!(matches!(err, Err(RecogError::Source { .. })));
    }

    #[test]
    fn missing_match_target_uses_empty_key() {
        static UNTARGETED: &[(&str, &[u8])] = &[(
            "misc.xml",
            br#"<fingerprints>
  <fingerprint pattern="^misc$"/>
</fingerprints>"#,
        )];
        let set = FingerprintSet::load_embedded(UNTARGETED, &LoadOptions::default()).unwrap();
        assert_eq!(set.aliases(), vec!["", "misc.xml"]);
        assert!(Arc::ptr_eq(set.get("").unwrap(), set.get("misc.xml").unwrap()));
        assert!(set.match_first("", "misc").matched);
    }

    #[test]
    fn empty_set() {
        let set = FingerprintSet::new();
        assert!(set.is_empty());
        assert!(set.aliases().is_empty());
        assert!(set.verify_all(Path::new(".")).is_ok());
    }

    #[test]
    fn verify_all_reports_failures() {
        static BAD_EXAMPLE: &[(&str, &[u8])] = &[(
            "bad.xml",
            br#"<fingerprints matches="bad">
  <fingerprint pattern="^Model (\w+)$">
    <example hw.product="Y">Model Z</example>
    <param pos="1" name="hw.product"/>
  </fingerprint>
</fingerprints>"#,
        )];
        let set = FingerprintSet::load_embedded(BAD_EXAMPLE, &LoadOptions::default()).unwrap();
        let err = set.verify_all(Path::new(".")).unwrap_err();
        assert!(matches!(err, RecogError::Verification(_)));
    }

    #[test]
    fn concurrent_matching() {
        let set = Arc::new(bundle());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| set.match_first("ssh.banner", "SSH-2.0-OpenSSH_9.6").matched)
                        .all(|m| m)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn set_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FingerprintSet>();
    }
}
