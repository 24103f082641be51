//! Ordering of dataset names by their embedded level number.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How sort keys are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameOrdering {
    /// Compare keys as strings. `_10` sorts above `_2`, and `__1` above
    /// `_2`, so level numbers only order correctly when zero padded.
    #[default]
    Lexical,
    /// Compare the digit runs of the keys as numbers, left to right.
    Numeric,
}

/// Remove the `3D`/`3d` marker from a dataset name.
pub fn strip_3d_marker(name: &str) -> String {
    name.replace("3D", "").replace("3d", "")
}

/// Digits and underscores of a name, after removing the `3D` marker.
pub fn sort_key(name: &str) -> String {
    strip_3d_marker(name)
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Order names descending by their sort key; equal keys keep their input order.
pub fn numeric_sort_descending<S: AsRef<str>>(names: &[S], ordering: NameOrdering) -> Vec<String> {
    let mut keyed: Vec<(String, String)> = names
        .iter()
        .map(|n| (sort_key(n.as_ref()), n.as_ref().to_string()))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| match ordering {
        NameOrdering::Lexical => b.cmp(a),
        NameOrdering::Numeric => compare_digit_runs(b, a),
    });

    keyed.into_iter().map(|(_, name)| name).collect()
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let runs_a = a.split('_').filter(|r| !r.is_empty());
    let mut runs_b = b.split('_').filter(|r| !r.is_empty());

    for run_a in runs_a {
        let Some(run_b) = runs_b.next() else {
            return Ordering::Greater;
        };
        let ord = compare_numeric(run_a, run_b);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    if runs_b.next().is_some() {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

/// Compare two digit strings by value without parsing (no overflow).
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
