use std::fmt;
use timeline::InstantTime;

/// Extension of base files.
pub const BASE_EXTENSION: &str = ".base";

/// Parsed form of `<file_id>_<instant>.base`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BaseFileName {
    pub file_id: String,
    pub instant: InstantTime,
}

impl BaseFileName {
    pub fn new(file_id: impl Into<String>, instant: InstantTime) -> Self {
        Self {
            file_id: file_id.into(),
            instant,
        }
    }

    /// Returns `None` for anything that is not a base file name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(BASE_EXTENSION)?;
        let (file_id, instant) = stem.rsplit_once('_')?;
        if file_id.is_empty() || file_id.starts_with('.') {
            return None;
        }
        Some(Self {
            file_id: file_id.to_string(),
            instant: instant.parse().ok()?,
        })
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}_{}{}", self.file_id, self.instant, BASE_EXTENSION)
    }
}

impl fmt::Display for BaseFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}
