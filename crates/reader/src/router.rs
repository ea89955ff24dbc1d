//! Key to file-slice routing.
//!
//! The write path places a key in file group `bucket_of(key, n)` where `n`
//! is the number of file groups in the partition, sorted by file id. The
//! hash is the 31-multiplier polynomial over UTF-16 code units with `i32`
//! wrap-around, so the same key lands in the same bucket in every process
//! and on every platform.

use crate::fs_view::FileSlice;

/// Polynomial string hash over UTF-16 code units (`h = 31 * h + unit`).
#[must_use]
pub fn key_hash(key: &str) -> i32 {
    key.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Bucket of `key` among `bucket_count` file groups.
///
/// `abs(abs(hash) % n)`; the outer `abs` covers `i32::MIN`, whose absolute
/// value does not fit in an `i32`. A zero `bucket_count` is treated as one.
#[must_use]
pub fn bucket_of(key: &str, bucket_count: usize) -> usize {
    let n = bucket_count.max(1) as i64;
    let h = i64::from(key_hash(key).wrapping_abs());
    (h % n).unsigned_abs() as usize
}

/// Groups `keys` by the file slice each routes to.
///
/// Groups come back in slice order and keys keep their input order within a
/// group. An empty `slices` yields no groups: the partition has nothing
/// materialized yet, which callers treat as "not found".
pub fn route<'a>(slices: &'a [FileSlice], keys: &[String]) -> Vec<(&'a FileSlice, Vec<String>)> {
    if slices.is_empty() {
        return Vec::new();
    }
    let mut groups: Vec<Vec<String>> = vec![Vec::new(); slices.len()];
    for key in keys {
        groups[bucket_of(key, slices.len())].push(key.clone());
    }
    slices
        .iter()
        .zip(groups)
        .filter(|(_, keys)| !keys.is_empty())
        .collect()
}
