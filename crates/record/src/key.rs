//! Record key builders.
//!
//! Column-stats and bloom-filter keys are concatenations of fixed-width hash
//! ids, so a shorter concatenation is a valid key prefix and no id can be the
//! prefix of a different one ("col1" never matches "col10").

use xxhash_rust::xxh3::xxh3_64;

/// Key of the `files` record listing every dataset partition.
pub const ALL_PARTITIONS: &str = "__all_partitions__";

/// Name used for the single partition of a non-partitioned dataset.
pub const NON_PARTITIONED: &str = ".";

/// Width in characters of one id segment.
pub const ID_WIDTH: usize = 16;

fn id(s: &str) -> String {
    format!("{:016x}", xxh3_64(s.as_bytes()))
}

fn partition_id(partition: &str) -> String {
    if partition.is_empty() {
        id(NON_PARTITIONED)
    } else {
        id(partition)
    }
}

/// Key of the `files` record for one dataset partition.
#[must_use]
pub fn files(partition: &str) -> String {
    if partition.is_empty() {
        NON_PARTITIONED.to_string()
    } else {
        partition.to_string()
    }
}

/// Key of the column-stats record for `column` in `file` of `partition`.
#[must_use]
pub fn column_stats(column: &str, partition: &str, file: &str) -> String {
    format!("{}{}{}", id(column), partition_id(partition), id(file))
}

/// Prefix covering every column-stats record of `column`, optionally narrowed
/// to one partition.
#[must_use]
pub fn column_stats_prefix(column: &str, partition: Option<&str>) -> String {
    match partition {
        Some(p) => format!("{}{}", id(column), partition_id(p)),
        None => id(column),
    }
}

/// Key of the bloom-filter record for `file` in `partition`.
#[must_use]
pub fn bloom_filter(partition: &str, file: &str) -> String {
    format!("{}{}", partition_id(partition), id(file))
}

/// Prefix covering every bloom-filter record of `partition`.
#[must_use]
pub fn bloom_filter_prefix(partition: &str) -> String {
    partition_id(partition)
}
