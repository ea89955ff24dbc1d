//! Instants and their on-disk file names.
//!
//! ## File names
//!
//! ```text
//! 20240101120000000.deltacommit             completed
//! 20240101120000000.deltacommit.inflight    inflight
//! 20240101120000000.deltacommit.requested   requested
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TimelineError;

/// A point on a timeline, parsed from its digit-string timestamp.
///
/// Timestamps are fixed-width digit strings on disk; comparing them as
/// integers gives the same order as comparing the strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstantTime(u64);

/// Timestamp used by the bootstrap commit. Always a valid block instant.
pub const SOLO_COMMIT_TIMESTAMP: InstantTime = InstantTime(0);

impl InstantTime {
    #[must_use]
    pub const fn new(ts: u64) -> Self {
        Self(ts)
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstantTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == SOLO_COMMIT_TIMESTAMP {
            write!(f, "00000000000000")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for InstantTime {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimelineError::InvalidTimestamp(s.to_string()));
        }
        s.parse::<u64>()
            .map(InstantTime)
            .map_err(|_| TimelineError::InvalidTimestamp(s.to_string()))
    }
}

impl TryFrom<String> for InstantTime {
    type Error = TimelineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<InstantTime> for String {
    fn from(t: InstantTime) -> Self {
        t.to_string()
    }
}

impl From<u64> for InstantTime {
    fn from(ts: u64) -> Self {
        Self(ts)
    }
}

/// The kind of operation an instant records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Commit,
    DeltaCommit,
    ReplaceCommit,
    Compaction,
    LogCompaction,
    Clean,
    Rollback,
    Restore,
    Savepoint,
    Indexing,
}

impl Action {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Commit => "commit",
            Action::DeltaCommit => "deltacommit",
            Action::ReplaceCommit => "replacecommit",
            Action::Compaction => "compaction",
            Action::LogCompaction => "logcompaction",
            Action::Clean => "clean",
            Action::Rollback => "rollback",
            Action::Restore => "restore",
            Action::Savepoint => "savepoint",
            Action::Indexing => "indexing",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "commit" => Action::Commit,
            "deltacommit" => Action::DeltaCommit,
            "replacecommit" => Action::ReplaceCommit,
            "compaction" => Action::Compaction,
            "logcompaction" => Action::LogCompaction,
            "clean" => Action::Clean,
            "rollback" => Action::Rollback,
            "restore" => Action::Restore,
            "savepoint" => Action::Savepoint,
            "indexing" => Action::Indexing,
            _ => return None,
        })
    }

    /// Rollback and restore instants carry the commits they undid.
    #[must_use]
    pub fn is_rollback_or_restore(&self) -> bool {
        matches!(self, Action::Rollback | Action::Restore)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an instant. Ordered so that the later state compares
/// greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Requested,
    Inflight,
    Completed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Requested => "REQUESTED",
            State::Inflight => "INFLIGHT",
            State::Completed => "COMPLETED",
        })
    }
}

/// One entry of a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    pub time: InstantTime,
    pub action: Action,
    pub state: State,
}

impl Instant {
    #[must_use]
    pub fn new(time: impl Into<InstantTime>, action: Action, state: State) -> Self {
        Self {
            time: time.into(),
            action,
            state,
        }
    }

    #[must_use]
    pub fn completed(time: impl Into<InstantTime>, action: Action) -> Self {
        Self::new(time, action, State::Completed)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == State::Completed
    }

    /// File name of this instant inside a timeline directory.
    #[must_use]
    pub fn file_name(&self) -> String {
        match self.state {
            State::Completed => format!("{}.{}", self.time, self.action),
            State::Inflight => format!("{}.{}.inflight", self.time, self.action),
            State::Requested => format!("{}.{}.requested", self.time, self.action),
        }
    }

    /// Parses a timeline file name.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineError::InvalidFileName`] if the name does not follow
    /// `<ts>.<action>[.<state>]`.
    pub fn from_file_name(name: &str) -> Result<Self, TimelineError> {
        let invalid = || TimelineError::InvalidFileName(name.to_string());

        let mut parts = name.split('.');
        let ts = parts.next().ok_or_else(invalid)?;
        let action = parts.next().and_then(Action::parse).ok_or_else(invalid)?;
        let state = match parts.next() {
            None => State::Completed,
            Some("inflight") => State::Inflight,
            Some("requested") => State::Requested,
            Some(_) => return Err(invalid()),
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        let time: InstantTime = ts.parse().map_err(|_| invalid())?;

        Ok(Self {
            time,
            action,
            state,
        })
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}__{}__{}]", self.time, self.action, self.state)
    }
}
