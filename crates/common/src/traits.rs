//! Collaborator traits for the recog engine
//!
//! - `FingerprintSource`: where corpus documents come from (a directory on
//!   disk or a read-only bundle compiled into the binary)
//! - `DiagnosticSink`: optional receiver for match tracing

use crate::error::RecogResult;
use std::io::Read;

/// One entry returned by [`FingerprintSource::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub is_dir: bool,
}

impl SourceEntry {
    #[inline]
    #[must_use]
    pub fn file<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn dir<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// A directory-like collection of corpus documents.
///
/// Paths are relative to the root of the source; `""` names the root itself.
pub trait FingerprintSource: Send + Sync {
    /// List the entries of a directory.
    fn list(&self, dir: &str) -> RecogResult<Vec<SourceEntry>>;

    /// Open an entry for reading.
    fn open(&self, path: &str) -> RecogResult<Box<dyn Read + '_>>;

    /// Human readable description used in log lines
    fn describe(&self) -> String {
        "fingerprint source".to_string()
    }

    /// Read a whole entry into memory.
    fn read(&self, path: &str) -> RecogResult<Vec<u8>> {
        let mut reader = self.open(path)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Receiver for "matched" / "no match" trace lines.
pub trait DiagnosticSink: Send + Sync {
    fn trace(&self, line: &str);
}

/// Sink that forwards trace lines to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn trace(&self, line: &str) {
        tracing::debug!(target: "recog::match", "{}", line);
    }
}
