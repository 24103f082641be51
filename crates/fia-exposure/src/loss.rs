//! Loss potential lookup by closest depth.

use crate::{ExposureError, Result};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Columns a loss table must provide.
pub const REQUIRED_FIELDS: [&str; 4] = ["Depth", "PotentialLoss", "Size", "SpaceUse"];

/// One depth/damage entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossTableRow {
    pub depth: f64,
    pub potential_loss: f64,
    /// Reference area of `potential_loss`; `0` means the loss is not scaled.
    pub size: f64,
    pub space_use: String,
}

/// Depth-damage table, rows sorted ascending by depth.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LossTable {
    rows: Vec<LossTableRow>,
}

impl LossTable {
    /// Build a table from rows in any order.
    pub fn from_rows(mut rows: Vec<LossTableRow>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|r| !r.depth.is_finite()) {
            return Err(ExposureError::InvalidLossTable(format!(
                "depth {} is not a number",
                row.depth
            )));
        }
        rows.sort_by(|a, b| a.depth.total_cmp(&b.depth));
        Ok(Self { rows })
    }

    /// Build a table from index-aligned columns.
    pub fn from_columns(
        depth: Vec<f64>,
        potential_loss: Vec<f64>,
        size: Vec<f64>,
        space_use: Vec<String>,
    ) -> Result<Self> {
        let n = depth.len();
        if potential_loss.len() != n || size.len() != n || space_use.len() != n {
            return Err(ExposureError::InvalidLossTable(format!(
                "column lengths differ: Depth {}, PotentialLoss {}, Size {}, SpaceUse {}",
                n,
                potential_loss.len(),
                size.len(),
                space_use.len()
            )));
        }
        let rows = depth
            .into_iter()
            .zip(potential_loss)
            .zip(size)
            .zip(space_use)
            .map(|(((depth, potential_loss), size), space_use)| LossTableRow {
                depth,
                potential_loss,
                size,
                space_use,
            })
            .collect();
        Self::from_rows(rows)
    }

    /// Import a loss table from a CSV file with a header row.
    pub fn import<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Importing loss table {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Read a loss table from CSV data with a header row.
    ///
    /// Header names match case-insensitively. Rows with an empty depth are
    /// skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let column = |field: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(field));
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|f| column(f).is_none())
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ExposureError::MissingLossFields(missing));
        }
        let [depth_col, loss_col, size_col, use_col] = REQUIRED_FIELDS.map(|f| column(f).unwrap_or(0));

        let mut rows = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record?;
            let cell = |col: usize| record.get(col).unwrap_or("");
            if cell(depth_col).is_empty() {
                continue;
            }
            let number = |col: usize, name: &str| -> Result<f64> {
                let text = cell(col);
                if text.is_empty() {
                    return Ok(0.0);
                }
                text.parse().map_err(|_| {
                    ExposureError::InvalidLossTable(format!(
                        "row {}: {} '{}' is not a number",
                        line + 2,
                        name,
                        text
                    ))
                })
            };
            rows.push(LossTableRow {
                depth: number(depth_col, "Depth")?,
                potential_loss: number(loss_col, "PotentialLoss")?,
                size: number(size_col, "Size")?,
                space_use: cell(use_col).to_string(),
            });
        }
        Self::from_rows(rows)
    }

    pub fn rows(&self) -> &[LossTableRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Depths in ascending order.
    pub fn depths(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.depth).collect()
    }

    /// Row with the depth closest to `mean_depth`.
    pub fn closest_row(&self, mean_depth: f64) -> Option<&LossTableRow> {
        let (_, index) = find_closest(&self.depths(), mean_depth)?;
        self.rows.get(index)
    }

    /// Loss potential for a feature with the given mean depth and flooded area.
    ///
    /// The loss of the closest-depth row is used whole when its size is zero,
    /// otherwise scaled by `flooded_area / size`.
    pub fn lookup(&self, mean_depth: f64, flooded_area: f64) -> Option<f64> {
        let row = self.closest_row(mean_depth)?;
        if row.size == 0.0 {
            Some(row.potential_loss)
        } else {
            Some(row.potential_loss * flooded_area / row.size)
        }
    }
}

/// Closest value in an ascending slice and its index.
///
/// Values outside the range clamp to the first or last entry. Between two
/// entries the nearer one wins, the lower one on a tie.
pub fn find_closest(sorted: &[f64], value: f64) -> Option<(f64, usize)> {
    let last = sorted.len().checked_sub(1)?;
    let pos = sorted.partition_point(|x| *x < value);
    if pos == 0 {
        return Some((sorted[0], 0));
    }
    if pos > last {
        return Some((sorted[last], last));
    }
    let (before, after) = (sorted[pos - 1], sorted[pos]);
    if after - value < value - before {
        Some((after, pos))
    } else {
        Some((before, pos - 1))
    }
}
