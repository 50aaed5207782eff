//! Change summaries between two observations.
//!
//! Two tools live here. [`diff_objects`] walks arbitrary JSON trees and
//! reports leaf-level `{path, before, after}` records. [`summarize_identity_list`]
//! compares ordered lists of opaque identifiers (gallery images, result
//! ids) as sets plus order, which is the useful signal for those fields.
//! [`summarize_changes`] combines both for normalized signals.

use crate::error::Result;
use crate::images::image_key;
use crate::signal::NormalizedSignal;
use crate::stable::stable_serialize_opt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

/// A leaf-level difference. `None` means the value was absent on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

/// Set-and-order summary of an identity list change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    /// Length of the new list.
    pub count: usize,
    pub primary_changed: bool,
    pub reordered: bool,
    pub added_count: usize,
    pub removed_count: usize,
}

/// One entry of a signal change summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldChange {
    Value(Change),
    List { path: String, summary: ListSummary },
}

impl FieldChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Value(c) => &c.path,
            Self::List { path, .. } => path,
        }
    }
}

/// Structural diff of two JSON trees.
///
/// Subtrees with equal stable serializations produce nothing. Objects are
/// walked over the sorted union of their keys; anything else (scalars,
/// arrays, `null`, mismatched types) is reported as one leaf change at the
/// dotted path reached so far. The root path is the empty string.
pub fn diff_objects(before: &Value, after: &Value) -> Vec<Change> {
    diff_optional(Some(before), Some(after))
}

/// [`diff_objects`] where either side may be absent.
pub fn diff_optional(before: Option<&Value>, after: Option<&Value>) -> Vec<Change> {
    let mut out = Vec::new();
    diff_node("", before, after, &mut out);
    out
}

fn diff_node(path: &str, before: Option<&Value>, after: Option<&Value>, out: &mut Vec<Change>) {
    if stable_serialize_opt(before) == stable_serialize_opt(after) {
        return;
    }

    match (before, after) {
        (Some(Value::Object(b)), Some(Value::Object(a))) => {
            let keys: BTreeSet<&String> = b.keys().chain(a.keys()).collect();
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                diff_node(&child, b.get(key.as_str()), a.get(key.as_str()), out);
            }
        }
        _ => out.push(Change {
            path: path.to_string(),
            before: before.cloned(),
            after: after.cloned(),
        }),
    }
}

/// Compare two lists of identifiers by key.
///
/// Returns `None` unless both sides are arrays of strings.
pub fn summarize_identity_list<F>(before: &Value, after: &Value, key: F) -> Option<ListSummary>
where
    F: Fn(&str) -> String,
{
    let before_keys: Vec<String> = string_items(before)?.into_iter().map(&key).collect();
    let after_keys: Vec<String> = string_items(after)?.into_iter().map(&key).collect();

    let before_set: HashSet<&String> = before_keys.iter().collect();
    let after_set: HashSet<&String> = after_keys.iter().collect();

    let added_count = after_set.difference(&before_set).count();
    let removed_count = before_set.difference(&after_set).count();
    let reordered = added_count == 0
        && removed_count == 0
        && before_keys.len() == after_keys.len()
        && before_keys != after_keys;
    let primary_changed = before_keys.first() != after_keys.first();

    Some(ListSummary {
        count: after_keys.len(),
        primary_changed,
        reordered,
        added_count,
        removed_count,
    })
}

fn string_items(value: &Value) -> Option<Vec<&str>> {
    value.as_array()?.iter().map(Value::as_str).collect()
}

/// Comparison key for identity-list fields of a signal, `None` for
/// fields compared as plain values.
fn identity_key(path: &str) -> Option<fn(&str) -> String> {
    match path {
        "imageUrls" => Some(image_key),
        "results" => Some(str::to_string),
        _ => None,
    }
}

/// Change summary between two normalized signals.
///
/// Leaf changes on identity-list fields are replaced by their
/// [`ListSummary`]; everything else is reported as returned by
/// [`diff_objects`].
pub fn summarize_changes(before: &NormalizedSignal, after: &NormalizedSignal) -> Result<Vec<FieldChange>> {
    let before = serde_json::to_value(before)?;
    let after = serde_json::to_value(after)?;

    let changes = diff_objects(&before, &after)
        .into_iter()
        .map(|change| {
            let summary = identity_key(&change.path).and_then(|key| {
                let b = change.before.as_ref()?;
                let a = change.after.as_ref()?;
                summarize_identity_list(b, a, key)
            });
            match summary {
                Some(summary) => FieldChange::List {
                    path: change.path,
                    summary,
                },
                None => FieldChange::Value(change),
            }
        })
        .collect();
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{ProductSignal, RankingSignal, TrackedHit};
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    fn ids(v: &[&str]) -> Value {
        json!(v)
    }

    #[test]
    fn test_identical_values_have_no_changes() {
        let x = json!({"a": [1, {"b": null}], "c": {"d": "e"}});
        assert!(diff_objects(&x, &x).is_empty());
        let reordered = json!({"c": {"d": "e"}, "a": [1, {"b": null}]});
        assert!(diff_objects(&x, &reordered).is_empty());
    }

    #[test]
    fn test_nested_leaf_paths() {
        let before = json!({"price": 10, "meta": {"seller": "A", "stock": 3}, "gone": true});
        let after = json!({"price": 12, "meta": {"seller": "A", "stock": 4}, "new": "x"});
        let changes = diff_objects(&before, &after);
        assert_json_eq!(
            serde_json::to_value(&changes).unwrap(),
            json!([
                {"path": "gone", "before": true},
                {"path": "meta.stock", "before": 3, "after": 4},
                {"path": "new", "after": "x"},
                {"path": "price", "before": 10, "after": 12}
            ])
        );
    }

    #[test]
    fn test_arrays_are_reported_whole() {
        let changes = diff_objects(&json!({"xs": [1, 2, 3]}), &json!({"xs": [1, 2, 4]}));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "xs");
        assert_eq!(changes[0].after, Some(json!([1, 2, 4])));
    }

    #[test]
    fn test_type_mismatch_and_root() {
        let changes = diff_objects(&json!({"a": {"b": 1}}), &json!({"a": null}));
        assert_eq!(changes[0].path, "a");
        assert_eq!(changes[0].after, Some(Value::Null));

        let root = diff_objects(&json!(1), &json!("1"));
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].path, "");
    }

    #[test]
    fn test_null_differs_from_absent() {
        let changes = diff_objects(&json!({"a": null}), &json!({}));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].before, Some(Value::Null));
        assert_eq!(changes[0].after, None);
    }

    #[test]
    fn test_pure_reorder() {
        let s = summarize_identity_list(&ids(&["a", "b", "c"]), &ids(&["c", "a", "b"]), str::to_string)
            .unwrap();
        assert_eq!(
            s,
            ListSummary {
                count: 3,
                primary_changed: true,
                reordered: true,
                added_count: 0,
                removed_count: 0,
            }
        );
    }

    #[test]
    fn test_pure_addition() {
        let s = summarize_identity_list(&ids(&["a", "b"]), &ids(&["a", "b", "c"]), str::to_string)
            .unwrap();
        assert_eq!(s.added_count, 1);
        assert_eq!(s.removed_count, 0);
        assert!(!s.reordered);
        assert!(!s.primary_changed);
        assert_eq!(s.count, 3);
    }

    #[test]
    fn test_empty_side_changes_primary() {
        let s = summarize_identity_list(&ids(&[]), &ids(&["a"]), str::to_string).unwrap();
        assert!(s.primary_changed);
        let s = summarize_identity_list(&ids(&[]), &ids(&[]), str::to_string).unwrap();
        assert!(!s.primary_changed);
    }

    #[test]
    fn test_non_string_lists_are_rejected() {
        assert!(summarize_identity_list(&json!([1, 2]), &ids(&["a"]), str::to_string).is_none());
        assert!(summarize_identity_list(&json!("a"), &ids(&["a"]), str::to_string).is_none());
    }

    #[test]
    fn test_image_variants_compare_by_key() {
        let before = ids(&[
            "https://m.media-amazon.com/images/I/41aa._AC_SL1500_.jpg",
            "https://m.media-amazon.com/images/I/41bb._AC_SL1500_.jpg",
        ]);
        let after = ids(&[
            "https://m.media-amazon.com/images/I/41aa._AC_SX300_.jpg",
            "https://m.media-amazon.com/images/I/41bb._AC_US40_.jpg",
        ]);
        let s = summarize_identity_list(&before, &after, image_key).unwrap();
        assert_eq!(s.added_count + s.removed_count, 0);
        assert!(!s.reordered);
        assert!(!s.primary_changed);
    }

    fn product(price: Option<f64>, images: &[&str]) -> NormalizedSignal {
        NormalizedSignal::Product(ProductSignal {
            title: "Widget".into(),
            price,
            rating: None,
            review_count: None,
            bullets: vec![],
            image_urls: images.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_signal_summary_mixes_value_and_list_changes() {
        let before = product(Some(10.0), &["https://x/images/I/a.jpg", "https://x/images/I/b.jpg"]);
        let after = product(None, &["https://x/images/I/b.jpg", "https://x/images/I/a.jpg"]);
        let changes = summarize_changes(&before, &after).unwrap();

        assert_json_eq!(
            serde_json::to_value(&changes).unwrap(),
            json!([
                {
                    "type": "list",
                    "path": "imageUrls",
                    "summary": {
                        "count": 2,
                        "primaryChanged": true,
                        "reordered": true,
                        "addedCount": 0,
                        "removedCount": 0
                    }
                },
                {"type": "value", "path": "price", "before": 10.0}
            ])
        );
    }

    #[test]
    fn test_signal_summary_for_rankings() {
        let before = NormalizedSignal::Ranking(RankingSignal {
            results: vec!["A".into(), "B".into()],
            tracked: vec![TrackedHit::missing("C")],
        });
        let after = NormalizedSignal::Ranking(RankingSignal {
            results: vec!["A".into(), "B".into(), "C".into()],
            tracked: vec![TrackedHit {
                id: "C".into(),
                found: true,
                position: Some(3),
                sponsored: None,
            }],
        });
        let changes = summarize_changes(&before, &after).unwrap();
        assert_eq!(changes.len(), 2);
        assert!(matches!(
            &changes[0],
            FieldChange::List { path, summary } if path == "results" && summary.added_count == 1
        ));
        assert_eq!(changes[1].path(), "tracked");
    }

    #[test]
    fn test_equal_signals_have_empty_summary() {
        let a = product(Some(1.0), &["u"]);
        assert!(summarize_changes(&a, &a.clone()).unwrap().is_empty());
    }
}
