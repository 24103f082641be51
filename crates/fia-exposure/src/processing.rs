//! Matching of dataset names to risk levels.

use crate::name_sort::{numeric_sort_descending, strip_3d_marker, NameOrdering};
use crate::{ExposureError, Result, RiskLevelSpec};
use serde::Serialize;
use std::path::Path;

/// A dataset assigned to one risk level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingEntry {
    pub level_label: String,
    pub source_name: String,
    pub full_path: String,
}

/// Datasets of one workspace in severity order, least severe first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingList {
    pub entries: Vec<ProcessingEntry>,
    /// Names that contain no level label.
    pub unmatched: Vec<String>,
    /// Names whose level was already claimed by an earlier name.
    pub duplicates: Vec<String>,
}

impl ProcessingList {
    /// Whether any name failed to match a level.
    pub fn has_unmatched(&self) -> bool {
        !self.unmatched.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Level labels in list order.
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.level_label.as_str()).collect()
    }

    /// Entry for a level label.
    pub fn entry(&self, label: &str) -> Option<&ProcessingEntry> {
        self.entries.iter().find(|e| e.level_label == label)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProcessingEntry> {
        self.entries.iter()
    }
}

/// Build the processing list for the names found in `base_path`.
///
/// Names are visited in [`numeric_sort_descending`] order. Each name takes the
/// longest level label found in it at a digit boundary (ties by table order)
/// unless an earlier name already holds that label.
pub fn build<S: AsRef<str>>(
    names: &[S],
    spec: &RiskLevelSpec,
    base_path: &str,
    ordering: NameOrdering,
) -> ProcessingList {
    let mut claimed: Vec<Option<String>> = vec![None; spec.len()];
    let mut list = ProcessingList::default();

    for name in numeric_sort_descending(names, ordering) {
        let stripped = strip_3d_marker(&name);
        let best = spec
            .level_labels
            .iter()
            .enumerate()
            .filter(|(_, label)| contains_at_boundary(&stripped, label))
            .fold(None::<(usize, &String)>, |best, (i, label)| match best {
                Some((_, b)) if b.len() >= label.len() => best,
                _ => Some((i, label)),
            });

        match best {
            None => list.unmatched.push(name),
            Some((index, _)) if claimed[index].is_some() => list.duplicates.push(name),
            Some((index, _)) => claimed[index] = Some(name),
        }
    }

    list.entries = claimed
        .into_iter()
        .zip(&spec.level_labels)
        .filter_map(|(name, label)| {
            name.map(|source_name| ProcessingEntry {
                level_label: label.clone(),
                full_path: join_path(base_path, &source_name),
                source_name,
            })
        })
        .collect();
    list
}

/// Fail unless both lists cover the same levels in the same order.
pub fn ensure_matching_levels(surface: &ProcessingList, depth: &ProcessingList) -> Result<()> {
    if surface.labels() == depth.labels() {
        return Ok(());
    }
    Err(ExposureError::LevelMismatch {
        surface: surface.labels().iter().map(|l| l.to_string()).collect(),
        depth: depth.labels().iter().map(|l| l.to_string()).collect(),
    })
}

/// Whether `label` occurs in `name` with no digit directly before or after it.
fn contains_at_boundary(name: &str, label: &str) -> bool {
    if label.is_empty() {
        return false;
    }
    let bytes = name.as_bytes();
    name.match_indices(label).any(|(start, matched)| {
        let end = start + matched.len();
        let digit_before = start > 0 && bytes[start - 1].is_ascii_digit();
        let digit_after = end < bytes.len() && bytes[end].is_ascii_digit();
        !digit_before && !digit_after
    })
}

/// `base/name`, or `name` alone when `base` is empty.
pub fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        return name.to_string();
    }
    Path::new(base).join(name).to_string_lossy().into_owned()
}
