//! Which dataset instants a log block may belong to.
//!
//! A metadata write lands before the dataset commit it describes completes,
//! so a log block can carry the instant of a commit that never finished or
//! was later undone. Only blocks whose instant is in [`ValidInstants`] are
//! applied:
//!
//! - every completed instant on the dataset timeline;
//! - every commit rolled back by a completed rollback or restore that falls
//!   inside the window starting at the earliest completed instant (see
//!   [`RollbackBoundary`]); the metadata table recorded those rollbacks
//!   itself, so their blocks describe real state;
//! - [`SOLO_COMMIT_TIMESTAMP`], written by bootstrap.

use std::collections::HashSet;

use config::RollbackBoundary;
use timeline::{rolled_back_commits, ActiveTimeline, InstantTime, TimelineError, SOLO_COMMIT_TIMESTAMP};

/// The set of instants whose log blocks are trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidInstants {
    instants: HashSet<InstantTime>,
}

impl ValidInstants {
    /// Computes the valid set from the dataset timeline.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineError::MalformedMetadata`] naming the rollback or
    /// restore instant whose details cannot be read.
    pub fn compute(
        dataset: &ActiveTimeline,
        boundary: RollbackBoundary,
    ) -> Result<Self, TimelineError> {
        let mut instants: HashSet<InstantTime> = dataset.completed().map(|i| i.time).collect();

        if let Some(earliest) = instants.iter().min().copied() {
            for instant in dataset.rollback_and_restore() {
                if !instant.is_completed() || !boundary.admits(&instant.time, &earliest) {
                    continue;
                }
                let commits = rolled_back_commits(dataset, instant)?;
                tracing::trace!(%instant, ?commits, "rolled-back commits stay valid");
                instants.extend(commits);
            }
        }

        instants.insert(SOLO_COMMIT_TIMESTAMP);
        tracing::debug!(count = instants.len(), "computed valid instants");
        Ok(Self { instants })
    }

    /// Builds a set directly, for callers that already know it.
    pub fn from_instants<I: IntoIterator<Item = InstantTime>>(instants: I) -> Self {
        let mut instants: HashSet<InstantTime> = instants.into_iter().collect();
        instants.insert(SOLO_COMMIT_TIMESTAMP);
        Self { instants }
    }

    #[must_use]
    pub fn contains(&self, instant: InstantTime) -> bool {
        self.instants.contains(&instant)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instants.is_empty()
    }

    /// The instants in ascending order.
    #[must_use]
    pub fn sorted(&self) -> Vec<InstantTime> {
        let mut v: Vec<InstantTime> = self.instants.iter().copied().collect();
        v.sort();
        v
    }
}
