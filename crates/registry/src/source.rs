//! Fingerprint sources
//!
//! - `DirectorySource`: corpus files in a directory on disk
//! - `EmbeddedSource`: a read-only bundle of `(name, bytes)` pairs, typically
//!   produced by a build step with `include_bytes!`

use recog_common::{FingerprintSource, RecogError, RecogResult, SourceEntry};
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

/// Corpus files under a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a source-relative path, refusing to leave the root.
    fn resolve(&self, path: &str) -> RecogResult<PathBuf> {
        let rel = Path::new(path.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
        {
            return Err(RecogError::Source {
                path: path.to_string(),
                reason: "path escapes the source root".to_string(),
            });
        }
        Ok(self.root.join(rel))
    }
}

impl FingerprintSource for DirectorySource {
    fn list(&self, dir: &str) -> RecogResult<Vec<SourceEntry>> {
        let path = self.resolve(dir)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&path).map_err(|e| RecogError::Source {
            path: path.display().to_string(),
            reason: format!("failed to read directory: {}", e),
        })? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type()?.is_dir();
            entries.push(SourceEntry { name, is_dir });
        }
        Ok(entries)
    }

    fn open(&self, path: &str) -> RecogResult<Box<dyn Read + '_>> {
        let full = self.resolve(path)?;
        let file = std::fs::File::open(&full).map_err(|e| RecogError::Source {
            path: full.display().to_string(),
            reason: format!("failed to open: {}", e),
        })?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// An in-memory, read-only bundle of corpus files.
///
/// Names may contain `/` to express directories; only the root level is
/// listed by the registry.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedSource {
    files: &'static [(&'static str, &'static [u8])],
}

impl EmbeddedSource {
    #[must_use]
    pub const fn new(files: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { files }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FingerprintSource for EmbeddedSource {
    fn list(&self, dir: &str) -> RecogResult<Vec<SourceEntry>> {
        let prefix = dir.trim_matches('/');
        let mut entries: Vec<SourceEntry> = Vec::new();
        for (name, _) in self.files {
            let name = name.trim_start_matches('/');
            let rest = if prefix.is_empty() {
                name
            } else {
                match name.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                    Some(r) => r,
                    None => continue,
                }
            };
            let entry = match rest.split_once('/') {
                Some((child, _)) => SourceEntry::dir(child),
                None => SourceEntry::file(rest),
            };
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn open(&self, path: &str) -> RecogResult<Box<dyn Read + '_>> {
        let wanted = path.trim_start_matches('/');
        self.files
            .iter()
            .find(|(name, _)| name.trim_start_matches('/') == wanted)
            .map(|(_, data)| Box::new(Cursor::new(*data)) as Box<dyn Read>)
            .ok_or_else(|| RecogError::Source {
                path: path.to_string(),
                reason: "no such entry in bundle".to_string(),
            })
    }

    fn describe(&self) -> String {
        format!("embedded bundle ({} files)", self.files.len())
    }
}
