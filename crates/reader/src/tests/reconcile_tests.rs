use super::helpers::{bloom, keys, listing, stamp};
use crate::reconcile::{reconcile_keys, reconcile_prefixes};
use crate::scanner::LogValue;
use record::{FilesKind, MetadataPayload};

#[test]
fn log_value_overrides_base() {
    let out = reconcile_keys(
        &keys(&["k1"]),
        vec![bloom("k1", "v1")],
        vec![("k1".to_string(), Some(LogValue::Present(bloom("k1", "v2"))))],
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].1.as_ref().and_then(stamp), Some("v2"));
}

#[test]
fn one_entry_per_key_in_input_order() {
    let input = keys(&["c", "a", "missing", "a", "b"]);
    let out = reconcile_keys(
        &input,
        vec![bloom("a", "base"), bloom("c", "base")],
        vec![
            ("b".to_string(), Some(LogValue::Present(bloom("b", "log")))),
            ("missing".to_string(), None),
        ],
    );
    let got: Vec<(&str, Option<&str>)> = out
        .iter()
        .map(|(k, r)| (k.as_str(), r.as_ref().and_then(stamp)))
        .collect();
    assert_eq!(
        got,
        vec![
            ("c", Some("base")),
            ("a", Some("base")),
            ("missing", None),
            ("a", Some("base")),
            ("b", Some("log")),
        ]
    );
}

#[test]
fn log_delete_shadows_base() {
    let out = reconcile_keys(
        &keys(&["k1"]),
        vec![bloom("k1", "v1")],
        vec![("k1".to_string(), Some(LogValue::Deleted))],
    );
    assert_eq!(out[0].1, None);
}

#[test]
fn listings_are_combined_not_replaced() {
    let base = listing("2024", FilesKind::FileList, &[("f1", 10), ("f2", 20)]);
    let log = listing("2024", FilesKind::FileList, &[("f3", 30)]);
    let out = reconcile_keys(
        &keys(&["2024"]),
        vec![base],
        vec![("2024".to_string(), Some(LogValue::Present(log)))],
    );
    match out[0].1.as_ref().map(|r| &r.payload) {
        Some(MetadataPayload::Files(files)) => {
            let names: Vec<&str> = files.live_files().map(|(n, _)| n).collect();
            assert_eq!(names, vec!["f1", "f2", "f3"]);
        }
        other => panic!("expected a files listing, got {other:?}"),
    }
}

#[test]
fn prefix_union_is_sorted_and_drops_deletes() {
    let base = vec![bloom("p|a", "base"), bloom("p|c", "base"), bloom("p|d", "base")];
    let log = vec![
        ("p|b".to_string(), LogValue::Present(bloom("p|b", "log"))),
        ("p|c".to_string(), LogValue::Deleted),
        ("p|d".to_string(), LogValue::Present(bloom("p|d", "log"))),
        ("p|e".to_string(), LogValue::Deleted),
    ];
    let out = reconcile_prefixes(base, log);
    let got: Vec<(&str, Option<&str>)> = out.iter().map(|r| (r.key.as_str(), stamp(r))).collect();
    assert_eq!(
        got,
        vec![("p|a", Some("base")), ("p|b", Some("log")), ("p|d", Some("log"))]
    );
}

#[test]
fn no_base_file_means_log_only() {
    let out = reconcile_keys(
        &keys(&["x"]),
        Vec::new(),
        vec![("x".to_string(), Some(LogValue::Present(bloom("x", "log"))))],
    );
    assert_eq!(out[0].1.as_ref().and_then(stamp), Some("log"));
    assert!(reconcile_prefixes(Vec::new(), Vec::new()).is_empty());
}
