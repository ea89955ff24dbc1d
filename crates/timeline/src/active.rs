//! The active timeline: every instant found in a timeline directory, in
//! timestamp order, each in its latest state.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Action, Instant, InstantTime, State, TimelineError};

/// Instants of one table, sorted by `(time, action)`.
///
/// A timeline loaded with [`ActiveTimeline::load`] remembers its directory and
/// can be [`reload`](ActiveTimeline::reload)ed; one built from
/// [`ActiveTimeline::from_instants`] lives purely in memory.
#[derive(Debug, Clone, Default)]
pub struct ActiveTimeline {
    dir: Option<PathBuf>,
    instants: Vec<Instant>,
    /// Raw contents of completed rollback/restore instants.
    details: HashMap<Instant, Vec<u8>>,
}

impl ActiveTimeline {
    /// Loads every instant file in `dir`.
    ///
    /// When the requested, inflight and completed files of one instant all
    /// exist, only the most advanced state is kept. Files that do not parse
    /// as instants (sub-directories, properties) are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineError::Io`] if the directory or a detail file cannot
    /// be read.
    pub fn load(dir: &Path) -> Result<Self, TimelineError> {
        let mut latest: BTreeMap<(InstantTime, Action), State> = BTreeMap::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            match Instant::from_file_name(name) {
                Ok(instant) => {
                    let state = latest
                        .entry((instant.time, instant.action))
                        .or_insert(instant.state);
                    *state = (*state).max(instant.state);
                }
                Err(_) => tracing::trace!(file = name, "skipping non-instant timeline entry"),
            }
        }

        let instants: Vec<Instant> = latest
            .into_iter()
            .map(|((time, action), state)| Instant::new(time, action, state))
            .collect();

        let mut details = HashMap::new();
        for instant in instants
            .iter()
            .filter(|i| i.is_completed() && i.action.is_rollback_or_restore())
        {
            let bytes = fs::read(dir.join(instant.file_name()))?;
            details.insert(*instant, bytes);
        }

        Ok(Self {
            dir: Some(dir.to_path_buf()),
            instants,
            details,
        })
    }

    /// Builds an in-memory timeline. Instants are sorted on the way in.
    #[must_use]
    pub fn from_instants(mut instants: Vec<Instant>) -> Self {
        instants.sort();
        instants.dedup_by(|later, kept| {
            let same = later.time == kept.time && later.action == kept.action;
            if same {
                kept.state = kept.state.max(later.state);
            }
            same
        });
        Self {
            dir: None,
            instants,
            details: HashMap::new(),
        }
    }

    /// Attaches the serialized details of `instant` (rollback or restore
    /// metadata).
    #[must_use]
    pub fn with_details(mut self, instant: Instant, bytes: impl Into<Vec<u8>>) -> Self {
        self.details.insert(instant, bytes.into());
        self
    }

    /// Re-reads the timeline directory. In-memory timelines are unchanged.
    pub fn reload(&mut self) -> Result<(), TimelineError> {
        if let Some(dir) = self.dir.clone() {
            *self = Self::load(&dir)?;
        }
        Ok(())
    }

    /// All instants in timestamp order.
    #[must_use]
    pub fn instants(&self) -> &[Instant] {
        &self.instants
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instants.is_empty()
    }

    /// Completed instants of any action.
    pub fn completed(&self) -> impl Iterator<Item = &Instant> + '_ {
        self.instants.iter().filter(|i| i.is_completed())
    }

    /// Rollback and restore instants in any state.
    pub fn rollback_and_restore(&self) -> impl Iterator<Item = &Instant> + '_ {
        self.instants
            .iter()
            .filter(|i| i.action.is_rollback_or_restore())
    }

    /// Latest completed instant of any action.
    #[must_use]
    pub fn last_completed(&self) -> Option<&Instant> {
        self.completed().last()
    }

    /// Latest completed instant whose action is one of `actions`.
    #[must_use]
    pub fn last_completed_of(&self, actions: &[Action]) -> Option<&Instant> {
        self.completed().filter(|i| actions.contains(&i.action)).last()
    }

    /// Returns `true` if `time` belongs to a completed instant.
    #[must_use]
    pub fn is_completed_at(&self, time: InstantTime) -> bool {
        self.completed().any(|i| i.time == time)
    }

    /// Raw details stored with `instant`.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineError::MissingDetails`] if nothing was recorded.
    pub fn instant_details(&self, instant: &Instant) -> Result<&[u8], TimelineError> {
        self.details
            .get(instant)
            .map(|b| b.as_slice())
            .ok_or_else(|| TimelineError::MissingDetails {
                instant: instant.to_string(),
            })
    }
}
