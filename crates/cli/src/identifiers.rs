//! Identifier drift checker
//!
//! Corpus files assert literal identifiers (vendors, products, devices...).
//! Reference lists of the known values live in
//! `<recog_home>/identifiers/<category>.txt`, one value per line. Parameters
//! are extracted from every corpus file on blocking worker tasks and streamed
//! over a channel into an [`IdentifierSession`], which is then diffed against
//! the stored lists.

use anyhow::{anyhow, Context, Result};
use recog_common::ParameterRule;
use recog_fingerprint::DatabaseDocument;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Reference categories, in the order they are reported.
pub const CATEGORIES: [&str; 10] = [
    "device",
    "fields",
    "hw_family",
    "hw_product",
    "os_architecture",
    "os_family",
    "os_product",
    "service_family",
    "service_product",
    "vendor",
];

const FIELDS: &str = "fields";

/// Category a literal parameter value is tracked in, if any.
fn value_category(name: &str) -> Option<&'static str> {
    match name {
        "os.vendor" | "service.vendor" | "service.component.vendor" | "hw.vendor" => Some("vendor"),
        "os.device" | "service.device" | "hw.device" => Some("device"),
        "os.arch" => Some("os_architecture"),
        "os.product" => Some("os_product"),
        "os.family" => Some("os_family"),
        "hw.product" => Some("hw_product"),
        "hw.family" => Some("hw_family"),
        "service.product" | "service.component.product" => Some("service_product"),
        "service.family" => Some("service_family"),
        _ => None,
    }
}

/// Identifiers seen in the corpus files of one run.
#[derive(Debug, Clone)]
pub struct IdentifierSession {
    current: BTreeMap<&'static str, BTreeSet<String>>,
}

impl Default for IdentifierSession {
    fn default() -> Self {
        Self {
            current: CATEGORIES.iter().map(|c| (*c, BTreeSet::new())).collect(),
        }
    }
}

impl IdentifierSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one parameter.
    ///
    /// Every name is a field. Only literal, non-empty, non-interpolated
    /// values are tracked in their category.
    pub fn add(&mut self, param: &ParameterRule) {
        self.insert(FIELDS, &param.name);

        let value = param.value_str();
        if !param.is_literal() || value.trim().is_empty() || value.contains('{') {
            return;
        }
        if let Some(category) = value_category(&param.name) {
            self.insert(category, value);
        }
    }

    fn insert(&mut self, category: &'static str, value: &str) {
        self.current
            .entry(category)
            .or_default()
            .insert(value.to_string());
    }

    #[must_use]
    pub fn current(&self, category: &str) -> Option<&BTreeSet<String>> {
        self.current.get(category)
    }
}

/// Differences between the stored and the current identifiers of a category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drift {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl Drift {
    pub fn between(stored: &BTreeSet<String>, current: &BTreeSet<String>) -> Self {
        Self {
            added: current.difference(stored).cloned().collect(),
            removed: stored.difference(current).cloned().collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

fn identifiers_path(home: &Path, category: &str) -> PathBuf {
    home.join("identifiers").join(format!("{}.txt", category))
}

/// Read a stored reference list.
pub fn load_identifiers(home: &Path, category: &str) -> Result<BTreeSet<String>> {
    let path = identifiers_path(home, category);
    let data = std::fs::read_to_string(&path).with_context(|| {
        format!(
            "failed to load {:?} identifiers from {}; is $RECOG_HOME configured",
            category,
            path.display()
        )
    })?;
    Ok(data.lines().map(str::to_string).collect())
}

/// Rewrite a reference list: sorted values, each followed by a newline.
pub fn write_identifiers(home: &Path, category: &str, values: &BTreeSet<String>) -> Result<()> {
    let path = identifiers_path(home, category);
    let mut data = String::new();
    for value in values {
        data.push_str(value);
        data.push('\n');
    }
    std::fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))
}

/// Expand the command line into corpus files. Directories contribute their
/// `.xml` entries in name order.
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries = Vec::new();
            for entry in std::fs::read_dir(input)
                .with_context(|| format!("failed to read {}", input.display()))?
            {
                let path = entry?.path();
                if path.is_file() && path.extension().is_some_and(|e| e == "xml") {
                    entries.push(path);
                }
            }
            entries.sort();
            files.extend(entries);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            return Err(anyhow!("no such corpus file: {}", input.display()));
        }
    }
    Ok(files)
}

/// Parse one corpus file and stream its parameters into `tx`.
async fn extract_params(path: PathBuf, tx: mpsc::Sender<ParameterRule>) -> Result<()> {
    let doc = tokio::task::spawn_blocking(move || -> Result<DatabaseDocument> {
        let data = std::fs::read(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path.display().to_string();
        Ok(DatabaseDocument::parse(&name, &data)?)
    })
    .await??;

    debug!(database = %doc.name, fingerprints = doc.fingerprints.len(), "extracted parameters");
    for fp in doc.fingerprints {
        for param in fp.params {
            if tx.send(param).await.is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Build a session from corpus files, one worker task per file.
pub async fn collect(files: Vec<PathBuf>) -> Result<IdentifierSession> {
    let (tx, mut rx) = mpsc::channel::<ParameterRule>(1_000);

    let mut workers = Vec::with_capacity(files.len());
    for file in files {
        workers.push(tokio::spawn(extract_params(file, tx.clone())));
    }
    drop(tx);

    let mut session = IdentifierSession::new();
    while let Some(param) = rx.recv().await {
        session.add(&param);
    }

    let mut first_err = None;
    for worker in workers {
        if let Err(e) = worker.await? {
            error!("error: {:#}", e);
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(session),
    }
}

/// Run the drift check.
///
/// Returns `true` when drift was found and `zero` is not set, meaning the
/// process should exit with status 1.
pub async fn run_identifiers(
    inputs: Vec<PathBuf>,
    recog_home: PathBuf,
    write: bool,
    zero: bool,
) -> Result<bool> {
    let mut stored = BTreeMap::new();
    for category in CATEGORIES {
        stored.insert(category, load_identifiers(&recog_home, category)?);
    }

    let files = expand_inputs(&inputs)?;
    info!("checking identifiers in {} file(s)", files.len());
    let session = collect(files).await?;

    let mut drifted = false;
    for category in CATEGORIES {
        let empty = BTreeSet::new();
        let current = session.current(category).unwrap_or(&empty);
        let original = stored.get(category).unwrap_or(&empty);
        let drift = Drift::between(original, current);
        if drift.is_empty() {
            continue;
        }

        let label = category.to_uppercase();
        for value in &drift.removed {
            warn!("{} REMOVED VALUE: {}", label, value);
        }
        for value in &drift.added {
            warn!("{} NEW VALUE: {}", label, value);
        }
        drifted = true;

        if write {
            write_identifiers(&recog_home, category, current)?;
        }
    }

    Ok(drifted && !zero)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &str = r#"<fingerprints matches="snmp.sys_description">
  <fingerprint pattern="^Cisco IOS Software, (\S+) Software">
    <param pos="0" name="os.vendor" value="Cisco"/>
    <param pos="0" name="os.product" value="IOS"/>
    <param pos="0" name="hw.device" value="Router"/>
    <param pos="1" name="hw.product"/>
    <param pos="0" name="os.cpe23" value="cpe:/o:cisco:ios:{os.version}"/>
    <param pos="0" name="service.family" value="  "/>
  </fingerprint>
</fingerprints>"#;

    fn set_of(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn seed_home(home: &Path) {
        std::fs::create_dir_all(home.join("identifiers")).unwrap();
        for category in CATEGORIES {
            std::fs::write(identifiers_path(home, category), "").unwrap();
        }
    }

    #[test]
    fn session_categorizes_literals() {
        let mut session = IdentifierSession::new();
        session.add(&ParameterRule::literal("os.vendor", "Cisco"));
        session.add(&ParameterRule::literal("service.component.vendor", "OpenSSL"));
        session.add(&ParameterRule::literal("os.arch", "x86_64"));
        session.add(&ParameterRule::capture("hw.product", 1));
        session.add(&ParameterRule::literal("os.cpe23", "cpe:/o:{os.vendor}"));
        session.add(&ParameterRule::literal("os.family", ""));

        assert_eq!(session.current("vendor"), Some(&set_of(&["Cisco", "OpenSSL"])));
        assert_eq!(session.current("os_architecture"), Some(&set_of(&["x86_64"])));
        assert!(session.current("hw_product").unwrap().is_empty());
        assert!(session.current("os_family").unwrap().is_empty());
        assert_eq!(
            session.current("fields"),
            Some(&set_of(&[
                "hw.product",
                "os.arch",
                "os.cpe23",
                "os.family",
                "os.vendor",
                "service.component.vendor"
            ]))
        );
    }

    #[test]
    fn drift_between_sets() {
        let drift = Drift::between(&set_of(&["a", "b"]), &set_of(&["b", "c"]));
        assert_eq!(drift.added, vec!["c".to_string()]);
        assert_eq!(drift.removed, vec!["a".to_string()]);
        assert!(Drift::between(&set_of(&["a"]), &set_of(&["a"])).is_empty());
    }

    #[test]
    fn identifiers_files_round_trip() {
        let home = tempfile::tempdir().unwrap();
        seed_home(home.path());
        write_identifiers(home.path(), "vendor", &set_of(&["Zyxel", "Cisco"])).unwrap();

        let raw = std::fs::read_to_string(identifiers_path(home.path(), "vendor")).unwrap();
        assert_eq!(raw, "Cisco\nZyxel\n");
        assert_eq!(
            load_identifiers(home.path(), "vendor").unwrap(),
            set_of(&["Cisco", "Zyxel"])
        );
    }

    #[test]
    fn missing_reference_list_names_the_category() {
        let home = tempfile::tempdir().unwrap();
        let err = load_identifiers(home.path(), "vendor").unwrap_err();
        assert!(err.to_string().contains("\"vendor\" identifiers"));
    }

    #[tokio::test]
    async fn collect_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snmp_sysdescr.xml");
        std::fs::write(&path, CORPUS).unwrap();

        let session = collect(vec![path]).await.unwrap();
        assert_eq!(session.current("vendor"), Some(&set_of(&["Cisco"])));
        assert_eq!(session.current("os_product"), Some(&set_of(&["IOS"])));
        assert_eq!(session.current("device"), Some(&set_of(&["Router"])));
        assert!(session.current("service_family").unwrap().is_empty());
        assert!(session.current("fields").unwrap().contains("service.family"));
    }

    #[tokio::test]
    async fn collect_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xml");
        std::fs::write(&path, "<other/>").unwrap();
        assert!(collect(vec![path]).await.is_err());
    }

    #[tokio::test]
    async fn drift_sets_exit_code_and_writes() {
        let home = tempfile::tempdir().unwrap();
        seed_home(home.path());
        let corpus = tempfile::tempdir().unwrap();
        std::fs::write(corpus.path().join("snmp_sysdescr.xml"), CORPUS).unwrap();

        let failed = run_identifiers(
            vec![corpus.path().to_path_buf()],
            home.path().to_path_buf(),
            false,
            true,
        )
        .await
        .unwrap();
        assert!(!failed);
        assert_eq!(load_identifiers(home.path(), "vendor").unwrap(), BTreeSet::new());

        let failed = run_identifiers(
            vec![corpus.path().to_path_buf()],
            home.path().to_path_buf(),
            true,
            false,
        )
        .await
        .unwrap();
        assert!(failed);
        assert_eq!(load_identifiers(home.path(), "vendor").unwrap(), set_of(&["Cisco"]));

        // the written lists now match the corpus
        let failed = run_identifiers(
            vec![corpus.path().join("snmp_sysdescr.xml")],
            home.path().to_path_buf(),
            false,
            false,
        )
        .await
        .unwrap();
        assert!(!failed);
    }

    #[tokio::test]
    async fn missing_input_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        seed_home(home.path());
        let err = run_identifiers(
            vec![home.path().join("missing.xml")],
            home.path().to_path_buf(),
            false,
            false,
        )
        .await;
        assert!(err.is_err());
    }
}
