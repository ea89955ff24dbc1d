//! Log file names and their ordering.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use timeline::InstantTime;

/// Suffix of change-capture log files, which never hold metadata blocks.
pub const CDC_SUFFIX: &str = "-cdc";

/// Parsed form of `.<file_id>_<base_instant>.log.<version>_<write_token>[-cdc]`.
///
/// Ordering is `(file_id, base_instant, version, write_token)`, which is the
/// order in which a file group's logs were written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogFileName {
    pub file_id: String,
    pub base_instant: InstantTime,
    pub version: u32,
    pub write_token: String,
    pub cdc: bool,
}

impl LogFileName {
    #[must_use]
    pub fn new(file_id: impl Into<String>, base_instant: InstantTime, version: u32) -> Self {
        Self {
            file_id: file_id.into(),
            base_instant,
            version,
            write_token: "0-0-0".to_string(),
            cdc: false,
        }
    }

    /// Parses a file name, returning `None` if it is not a log file.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix('.')?;
        let (head, tail) = rest.split_once(".log.")?;
        let (file_id, base) = head.rsplit_once('_')?;
        if file_id.is_empty() {
            return None;
        }
        let base_instant: InstantTime = base.parse().ok()?;

        let (tail, cdc) = match tail.strip_suffix(CDC_SUFFIX) {
            Some(t) => (t, true),
            None => (tail, false),
        };
        let (version, write_token) = tail.split_once('_')?;
        let version: u32 = version.parse().ok()?;

        Some(Self {
            file_id: file_id.to_string(),
            base_instant,
            version,
            write_token: write_token.to_string(),
            cdc,
        })
    }

    /// The on-disk file name.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            ".{}_{}.log.{}_{}{}",
            self.file_id,
            self.base_instant,
            self.version,
            self.write_token,
            if self.cdc { CDC_SUFFIX } else { "" }
        )
    }
}

impl Ord for LogFileName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file_id
            .cmp(&other.file_id)
            .then_with(|| self.base_instant.cmp(&other.base_instant))
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.write_token.cmp(&other.write_token))
            .then_with(|| self.cdc.cmp(&other.cdc))
    }
}

impl PartialOrd for LogFileName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LogFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// A log file on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogFile {
    pub name: LogFileName,
    pub path: PathBuf,
}

impl LogFile {
    /// Builds a `LogFile` from a path whose file name parses as a log name.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = LogFileName::parse(path.file_name()?.to_str()?)?;
        Some(Self {
            name,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn is_cdc(&self) -> bool {
        self.name.cdc
    }
}
