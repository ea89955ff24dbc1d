//! Combining base-file records with merged log state.
//!
//! | base    | log              | result                       |
//! |---------|------------------|------------------------------|
//! | `b`     | absent           | `b`                          |
//! | absent  | `Present(l)`     | `l`                          |
//! | `b`     | `Present(l)`     | `b.combine(l)`               |
//! | any     | `Deleted`        | none (the delete shadows `b`) |

use record::{Combine, MetadataRecord};
use std::collections::{BTreeMap, HashMap};

use crate::scanner::LogValue;

fn merge(base: Option<MetadataRecord>, log: Option<LogValue>) -> Option<MetadataRecord> {
    match (base, log) {
        (_, Some(LogValue::Deleted)) => None,
        (Some(b), Some(LogValue::Present(l))) => Some(b.combine(l)),
        (None, Some(LogValue::Present(l))) => Some(l),
        (b, None) => b,
    }
}

/// One entry per requested key, in `keys` order, duplicates included.
///
/// `base` holds whatever the base file returned for `keys` (or nothing when
/// the slice has no base file); `log` is the scanner's answer for the same
/// keys.
pub fn reconcile_keys(
    keys: &[String],
    base: Vec<MetadataRecord>,
    log: Vec<(String, Option<LogValue>)>,
) -> Vec<(String, Option<MetadataRecord>)> {
    let base: HashMap<String, MetadataRecord> =
        base.into_iter().map(|r| (r.key.clone(), r)).collect();
    let log: HashMap<String, Option<LogValue>> = log.into_iter().collect();

    keys.iter()
        .map(|key| {
            let b = base.get(key).cloned();
            let l = log.get(key).cloned().flatten();
            (key.clone(), merge(b, l))
        })
        .collect()
}

/// Union of base and log records matching a prefix query, sorted by key,
/// with log deletes removing base records.
pub fn reconcile_prefixes(
    base: Vec<MetadataRecord>,
    log: Vec<(String, LogValue)>,
) -> Vec<MetadataRecord> {
    let mut merged: BTreeMap<String, Option<MetadataRecord>> =
        base.into_iter().map(|r| (r.key.clone(), Some(r))).collect();
    for (key, value) in log {
        let b = merged.remove(&key).flatten();
        merged.insert(key, merge(b, Some(value)));
    }
    merged.into_values().flatten().collect()
}
