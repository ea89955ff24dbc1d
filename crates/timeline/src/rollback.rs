//! Rollback and restore instant details.
//!
//! Both are stored as JSON in the completed instant file:
//!
//! ```text
//! 20240102.rollback   {"commitsRollback": ["20240101"]}
//! 20240103.restore    {"restoreMetadata": {"20240101": [{"commitsRollback": ["20240101"]}]}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Action, ActiveTimeline, Instant, InstantTime, TimelineError};

/// Details of a completed rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_rollback_time: Option<InstantTime>,
    pub commits_rollback: Vec<InstantTime>,
}

/// Details of a completed restore: one or more rollbacks per restored instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreMetadata {
    pub restore_metadata: BTreeMap<String, Vec<RollbackMetadata>>,
}

/// Returns the commits undone by a rollback or restore instant. Any other
/// action yields an empty list.
///
/// # Errors
///
/// Returns [`TimelineError::MalformedMetadata`] (naming the instant) if the
/// stored details do not deserialize, or [`TimelineError::MissingDetails`] if
/// there are none.
pub fn rolled_back_commits(
    timeline: &ActiveTimeline,
    instant: &Instant,
) -> Result<Vec<InstantTime>, TimelineError> {
    let malformed = |source| TimelineError::MalformedMetadata {
        instant: instant.to_string(),
        source,
    };

    match instant.action {
        Action::Rollback => {
            let bytes = timeline.instant_details(instant)?;
            let meta: RollbackMetadata = serde_json::from_slice(bytes).map_err(malformed)?;
            Ok(meta.commits_rollback)
        }
        Action::Restore => {
            let bytes = timeline.instant_details(instant)?;
            let meta: RestoreMetadata = serde_json::from_slice(bytes).map_err(malformed)?;
            Ok(meta
                .restore_metadata
                .into_values()
                .flatten()
                .flat_map(|rm| rm.commits_rollback)
                .collect())
        }
        _ => Ok(Vec::new()),
    }
}
