use anyhow::{bail, Context, Result};
use recog_common::{LoadOptions, RecogError, TracingSink};
use recog_fingerprint::lint_database;
use recog_registry::FingerprintSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::args::LoadArgs;
use crate::output::print_matches;

/// Build load options from an optional JSON file, then apply command line overrides.
pub fn load_options(args: &LoadArgs) -> Result<LoadOptions> {
    let options = match &args.config {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<LoadOptions>(&data)
                .map_err(|e| RecogError::Config(format!("{}: {}", path.display(), e)))?
        }
        None => LoadOptions::default(),
    };

    let options = match args.certainty_policy {
        Some(policy) => options.with_certainty_policy(policy.into()),
        None => options,
    };
    Ok(options.with_sink(Arc::new(TracingSink)))
}

/// Load a corpus directory off the async runtime.
async fn load_set(xml_dir: PathBuf, options: LoadOptions) -> Result<FingerprintSet> {
    let start = Instant::now();
    let dir = xml_dir.clone();
    let set = tokio::task::spawn_blocking(move || FingerprintSet::load_dir(&dir, &options))
        .await?
        .with_context(|| format!("error loading fingerprints from {}", xml_dir.display()))?;
    info!(
        "loaded {} database(s) from {} in {:?}",
        set.len(),
        xml_dir.display(),
        start.elapsed()
    );
    Ok(set)
}

pub async fn run_match(xml_dir: PathBuf, text: Vec<String>, load: LoadArgs) -> Result<()> {
    let options = load_options(&load)?;
    let set = load_set(xml_dir, options).await?;

    let stdout = std::io::stdout();
    if !text.is_empty() {
        print_matches(&set, &text.join(" "), &mut stdout.lock())?;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        print_matches(&set, &line, &mut stdout.lock())?;
    }
    Ok(())
}

pub async fn run_verify(
    xml_dir: PathBuf,
    examples: Option<PathBuf>,
    lint: bool,
    load: LoadArgs,
) -> Result<()> {
    let options = load_options(&load)?;
    let base = examples.unwrap_or_else(|| xml_dir.clone());
    let set = load_set(xml_dir, options).await?;

    for db in set.databases() {
        info!("loaded {} fingerprints from {}", db.len(), db.name());
    }

    if lint {
        let mut issues = 0;
        for db in set.databases() {
            for issue in lint_database(db, &base) {
                warn!("{}", issue);
                issues += 1;
            }
        }
        if issues > 0 {
            bail!("{} conformance issue(s) found", issues);
        }
        info!("no conformance issues found");
    }

    let set = Arc::new(set);
    let verify = Arc::clone(&set);
    tokio::task::spawn_blocking(move || verify.verify_all(&base))
        .await?
        .context("error verifying examples")?;
    info!("verified examples of {} database(s)", set.len());
    Ok(())
}
