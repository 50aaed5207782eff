//! Compare two JSON documents.

use crate::cli::output::{self, Styled};
use crate::cli::runs_cmd::describe_change;
use anyhow::{Context, Result};
use argus_core::{diff_objects, summarize_changes, FieldChange, NormalizedSignal};
use serde_json::Value;
use std::path::Path;

/// Changes between two documents. Two normalized signals get the signal
/// summary (identity lists collapsed); anything else the structural diff.
pub fn compare(before: &Value, after: &Value) -> Result<Vec<FieldChange>> {
    let signals = (
        serde_json::from_value::<NormalizedSignal>(before.clone()),
        serde_json::from_value::<NormalizedSignal>(after.clone()),
    );
    if let (Ok(before), Ok(after)) = signals {
        return Ok(summarize_changes(&before, &after)?);
    }
    Ok(diff_objects(before, after)
        .into_iter()
        .map(FieldChange::Value)
        .collect())
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

pub fn run(before: &Path, after: &Path) -> Result<()> {
    let changes = compare(&read_json(before)?, &read_json(after)?)?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&changes)?);
        return Ok(());
    }

    let s = Styled::new();
    if changes.is_empty() {
        eprintln!("  {} No changes", s.ok_sym());
        return Ok(());
    }
    for change in &changes {
        println!("{}", describe_change(change));
    }
    if !output::is_quiet() {
        eprintln!();
        eprintln!("  {} change(s)", changes.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_documents_use_structural_diff() {
        let changes = compare(&json!({"a": 1, "b": {"c": 2}}), &json!({"a": 1, "b": {"c": 3}})).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path(), "b.c");
    }

    #[test]
    fn test_signals_collapse_identity_lists() {
        let before = json!({"kind": "search", "results": ["A", "B", "C"], "tracked": []});
        let after = json!({"kind": "search", "results": ["C", "A", "B"], "tracked": []});
        let changes = compare(&before, &after).unwrap();
        assert_eq!(changes.len(), 1);
        match &changes[0] {
            FieldChange::List { path, summary } => {
                assert_eq!(path, "results");
                assert!(summary.reordered);
                assert!(summary.primary_changed);
            }
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn test_identical_documents_have_no_changes() {
        let doc = json!({"x": [1, 2], "y": null});
        assert!(compare(&doc, &doc).unwrap().is_empty());
    }

    #[test]
    fn test_integral_float_equals_integer() {
        let before = json!({"price": 20, "stock": [1, 2]});
        let after = json!({"price": 20.0, "stock": [1.0, 2]});
        assert!(compare(&before, &after).unwrap().is_empty());
    }
}
